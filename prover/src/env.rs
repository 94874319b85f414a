/// Loads variables from a `.env` file in the working directory or its
/// parents, if there is one. A missing file is not an error.
pub fn load_dotenvy_vars_if_present() -> Result<(), dotenvy::Error> {
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => Err(e),
        _ => Ok(()),
    }
}

//! Host platform (linux for example) utility functions

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<String> {
    Ok("HOST INFO NOT YET AVAILABLE".to_string())
}
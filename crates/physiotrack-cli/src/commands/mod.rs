pub mod config;
pub mod device;
pub mod mode;
pub mod patient;
pub mod session;
pub mod timer;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub mod backup;
pub mod config;
pub mod daemon;
pub mod group;
pub mod habit;
pub mod record;
pub mod round;
pub mod week;

mod context;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Pretty-print `value` as JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use clap::Subcommand;
use physiotrack_core::session::DeviceRegistry;
use physiotrack_core::storage::Database;
use serde_json::json;

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Print the paired device id
    Show,
    /// Pair a device by id without scanning
    Set {
        /// Device id as announced by the device
        id: String,
    },
}

pub fn run(action: DeviceAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    match action {
        DeviceAction::Show => {
            super::print_json(&json!({ "device": db.paired_device()? }))?;
        }
        DeviceAction::Set { id } => {
            let id = id.trim();
            if id.is_empty() {
                return Err("device id must not be empty".into());
            }
            db.set_paired_device(id)?;
            println!("paired with {id}");
        }
    }
    Ok(())
}

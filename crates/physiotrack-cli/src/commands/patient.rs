use clap::Subcommand;
use physiotrack_core::storage::Database;

#[derive(Subcommand)]
pub enum PatientAction {
    /// Register a patient
    Add {
        /// Patient identifier (stored lower-cased)
        id: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered patients
    List,
}

pub fn run(action: PatientAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        PatientAction::Add { id, name } => {
            if id.trim().is_empty() {
                return Err("patient id must not be empty".into());
            }
            if db.add_patient(&id, name.as_deref())? {
                println!("patient added: {}", id.trim().to_lowercase());
            } else {
                println!("patient already exists: {}", id.trim().to_lowercase());
            }
        }
        PatientAction::List => {
            super::print_json(&db.list_patients()?)?;
        }
    }
    Ok(())
}

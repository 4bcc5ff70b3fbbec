pub mod collaborator;
pub mod constants;
pub mod error;
pub mod event;
pub mod ledger;
pub mod params;
pub mod phase;
pub mod threshold;
pub mod types;

pub use collaborator::{CustodianProbe, NativeLedger, TokenLedger};
pub use constants::*;
pub use error::{CollaboratorError, ErrorKind, StakeError};
pub use event::{EventRecord, LedgerEvent};
pub use ledger::*;
pub use params::DeployParams;
pub use phase::{Phase, PhaseClock, PhaseDurations};
pub use threshold::ThresholdPolicy;
pub use types::*;

pub mod constants;
pub mod envelope;
pub mod failable;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::KeepAliveMessage;
pub use failable::FailableVec;
pub use types::{
    CameraState, HubConfiguration, HubLocalInfo, HubNameInfo, NewParticipant, Participant,
    PresentingState, SipState,
};

use crate::service::{bus::BusError, chat::ChatError};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Process exit statuses.
///
/// Every startup failure maps onto one of these so that a supervisor can tell
/// a credentials problem apart from a room problem without parsing logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Graceful shutdown after a signal.
    Success = 0,
    /// Configuration or template table could not be loaded. Also the status for any unclassified failure.
    Config = 1,
    /// The chat backend rejected the credentials, or could not be reached to check them.
    Auth = 2,
    /// A configured room identifier is malformed.
    RoomMalformed = 3,
    /// A configured room could not be found or joined.
    RoomUnavailable = 4,
    /// The bus subscriber could not be set up, or failed while running.
    Bus = 5,
}

impl ExitStatus {
    /// Classify an error chain.
    pub fn of(err: &Err) -> Self {
        if let Some(chat) = err.downcast_ref::<ChatError>() {
            return match chat {
                ChatError::BadCredentials { .. } | ChatError::LoginFailed { .. } | ChatError::NotLoggedIn => ExitStatus::Auth,
                ChatError::MalformedRoom { .. } => ExitStatus::RoomMalformed,
                ChatError::RoomUnavailable { .. } => ExitStatus::RoomUnavailable,
                // `ChatSession::broadcast` logs send failures and moves on, so one only
                // gets here from outside the relay; it says nothing about login or rooms.
                ChatError::SendFailed { .. } => ExitStatus::Config,
            };
        }

        if err.downcast_ref::<BusError>().is_some() {
            return ExitStatus::Bus;
        }

        ExitStatus::Config
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

// Tests.

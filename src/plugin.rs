//! Plugins extend a [`Session`] by registering hooks when started and
//! detaching them when stopped.

use crate::labels::LabelError;
use crate::session::{Session, SessionError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("No plugin named '{0}'")]
    UnknownPlugin(String),

    #[error("Plugin '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Plugin '{0}' is not running")]
    NotRunning(String),

    #[error("Plugin is not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

pub trait Plugin {
    /// Short name the session registers the plugin under.
    fn name(&self) -> &str;

    fn long_name(&self) -> &str {
        self.name()
    }

    fn start(&mut self, session: &mut Session) -> Result<(), PluginError>;

    /// Tidy up; must detach every hook `start` registered.
    fn stop(&mut self, session: &mut Session) -> Result<(), PluginError>;
}

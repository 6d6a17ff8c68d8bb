//! Instance-related type definitions.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::registry::Instance;

/// An instance record together with its derived public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: Instance,
    pub public_url: String,
}

impl InstanceView {
    pub fn new(instance: Instance, settings: &Settings) -> Self {
        let public_url = settings.public_url(&instance.namespace);
        Self {
            instance,
            public_url,
        }
    }
}

/// Pipeline step names recorded in `build_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildStep {
    Provision,
    Scaffold,
    Proxy,
    Supervisor,
    Register,
}

impl BuildStep {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Scaffold => "scaffold",
            Self::Proxy => "proxy",
            Self::Supervisor => "supervisor",
            Self::Register => "register",
        }
    }
}

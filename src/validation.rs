use std::collections::HashMap;

use crate::config::Settings;
use crate::error::{AppError, Result};

/// Longest accepted instance name. Leaves room for the namespace suffix
/// inside a 64-byte database identifier.
pub const MAX_NAME_LEN: usize = 60;

/// Longest accepted human-readable name.
pub const MAX_HUMAN_NAME_LEN: usize = 200;

/// Letters, digits and underscore: the character class shared by instance
/// names and namespaces.
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Why `name` is not an acceptable instance name, if it is not.
pub fn name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("must not be empty")
    } else if !name.chars().all(is_name_char) {
        Some("may only contain letters, digits and underscores")
    } else if name.len() > MAX_NAME_LEN {
        Some("is too long")
    } else {
        None
    }
}

pub fn validate_instance_name(name: &str) -> Result<()> {
    match name_problem(name) {
        Some(reason) => Err(AppError::invalid_name(name, reason)),
        None => Ok(()),
    }
}

fn human_name_problem(human_name: &str) -> Option<&'static str> {
    if human_name.trim().is_empty() {
        Some("must not be blank")
    } else if human_name.chars().count() > MAX_HUMAN_NAME_LEN {
        Some("is too long")
    } else if human_name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    }
}

/// Validate the user-supplied fields of a create request, collecting one
/// reason per offending field.
pub fn validate_create_fields(name: &str, human_name: Option<&str>) -> Result<()> {
    let mut fields = HashMap::new();
    if let Some(reason) = name_problem(name) {
        fields.insert("name".to_string(), reason.to_string());
    }
    if let Some(reason) = human_name.and_then(human_name_problem) {
        fields.insert("human_name".to_string(), reason.to_string());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(fields))
    }
}

pub fn validate_human_name(human_name: &str) -> Result<()> {
    match human_name_problem(human_name) {
        Some(reason) => Err(AppError::validation(HashMap::from([(
            "human_name".to_string(),
            reason.to_string(),
        )]))),
        None => Ok(()),
    }
}

/// Validate a settings candidate before it is committed, collecting one
/// reason per offending field.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    let mut fields = HashMap::new();
    if settings.host.is_empty() || settings.host.chars().any(|c| c.is_whitespace() || c == '/') {
        fields.insert("host".to_string(), "must be a bare host name".to_string());
    }
    if !matches!(settings.scheme.as_str(), "http" | "https") {
        fields.insert("scheme".to_string(), "must be http or https".to_string());
    }
    if settings.listen_port == 0 {
        fields.insert("listen_port".to_string(), "must not be 0".to_string());
    }
    if settings.port_base == 0 {
        fields.insert("port_base".to_string(), "must not be 0".to_string());
    }
    if settings.proxy_config_path.as_os_str().is_empty() {
        fields.insert(
            "proxy_config_path".to_string(),
            "must not be empty".to_string(),
        );
    }
    if settings.storage_root.as_os_str().is_empty() {
        fields.insert("storage_root".to_string(), "must not be empty".to_string());
    }
    if settings.credentials.db_user.is_empty() {
        fields.insert(
            "credentials.db_user".to_string(),
            "must not be empty".to_string(),
        );
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(fields))
    }
}

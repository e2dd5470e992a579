use super::models::{Config, StorageBackend};

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Non-fatal problems worth surfacing at startup.
pub fn collect_warnings(config: &Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if let Some(template) = config.playlist.external_url_template.as_deref()
        && !template.contains("{ip}")
    {
        warnings.push_with_hint(
            format!("external_url_template '{template}' has no {{ip}} placeholder and will be ignored"),
            "Use a template such as http://proxy:4022/rtp/{ip}:5000",
        );
    }

    if config.storage.backend == StorageBackend::Memory {
        warnings.push("memory storage selected; channels and runs are lost on exit");
    }

    if config
        .probe
        .extra_args
        .iter()
        .any(|arg| arg == "-i" || arg == "-y")
    {
        warnings.push_with_hint(
            "probe extra_args contains -i or -y, which the capture command already sets",
            "Remove input and overwrite flags from extra_args",
        );
    }

    warnings
}

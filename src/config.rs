use crate::utils::clean_phone_number;
use anyhow::Error;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    #[clap(long)]
    pub conf: Option<String>,
    /// Place an outgoing call to this number once the agent is up
    #[clap(long)]
    pub dial: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub backend: CallBackendConfig,
    pub settings: VoipSettings,
    pub ringtones: RingtoneConfig,
}

/// Which call-control backend the call service talks to.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CallBackendConfig {
    Memory,
    Http {
        url: String,
        headers: Option<HashMap<String, String>>,
    },
}

impl Default for CallBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Prod,
    Demo,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MobileCallMethod {
    Voip,
    Phone,
    Ask,
}

/// User-level VoIP settings, read-only from the agent's perspective.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct VoipSettings {
    pub mode: Mode,
    pub pbx_address: String,
    pub websocket_url: String,
    pub username: String,
    pub secret: String,
    pub auto_reject_incoming_calls: bool,
    pub call_from_another_device: bool,
    pub external_device_number: Option<String>,
    pub mobile_call_method: MobileCallMethod,
}

impl Default for VoipSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Demo,
            pbx_address: String::new(),
            websocket_url: String::new(),
            username: String::new(),
            secret: String::new(),
            auto_reject_incoming_calls: false,
            call_from_another_device: false,
            external_device_number: None,
            mobile_call_method: MobileCallMethod::Voip,
        }
    }
}

impl VoipSettings {
    pub fn credentials_set(&self) -> bool {
        !self.username.is_empty() && !self.secret.is_empty()
    }

    pub fn server_configured(&self) -> bool {
        !self.pbx_address.is_empty() && !self.websocket_url.is_empty()
    }

    pub fn valid_transfer_number(&self) -> bool {
        match &self.external_device_number {
            Some(number) => !clean_phone_number(number).is_empty(),
            None => false,
        }
    }

    /// Device relay: ring a secondary phone device instead of answering
    /// in place.
    pub fn will_call_from_another_device(&self) -> bool {
        self.call_from_another_device && self.valid_transfer_number()
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct CueSource {
    pub source: String,
    pub volume: Option<f32>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct RingtoneConfig {
    pub dial: CueSource,
    pub incoming: CueSource,
    pub ringback: CueSource,
}

impl Default for RingtoneConfig {
    fn default() -> Self {
        Self {
            dial: CueSource {
                source: "audio/dialtone.mp3".to_string(),
                volume: Some(0.7),
            },
            incoming: CueSource {
                source: "audio/ringtone_incoming.mp3".to_string(),
                volume: None,
            },
            ringback: CueSource {
                source: "audio/ringtone_outgoing.mp3".to_string(),
                volume: None,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_predicates() {
        let mut settings = VoipSettings::default();
        assert!(!settings.credentials_set());
        assert!(!settings.server_configured());
        assert!(!settings.will_call_from_another_device());

        settings.username = "101".to_string();
        settings.secret = "hunter2".to_string();
        settings.pbx_address = "pbx.example.com".to_string();
        settings.websocket_url = "wss://pbx.example.com/ws".to_string();
        assert!(settings.credentials_set());
        assert!(settings.server_configured());

        settings.call_from_another_device = true;
        assert!(!settings.will_call_from_another_device());
        settings.external_device_number = Some("ext.".to_string());
        assert!(!settings.will_call_from_another_device());
        settings.external_device_number = Some("+1 555 0100".to_string());
        assert!(settings.will_call_from_another_device());
    }

    #[test]
    fn test_config_from_toml() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"

            [backend]
            type = "http"
            url = "https://crm.example.com/voip"

            [settings]
            mode = "prod"
            pbx_address = "pbx.example.com"
            websocket_url = "wss://pbx.example.com/ws"
            username = "101"
            secret = "hunter2"
            auto_reject_incoming_calls = true
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.settings.mode, Mode::Prod);
        assert!(config.settings.auto_reject_incoming_calls);
        assert!(matches!(config.backend, CallBackendConfig::Http { .. }));
        assert_eq!(config.ringtones.dial.volume, Some(0.7));
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("softphone.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));

        assert!(Config::load("does-not-exist.toml").is_err());
    }
}

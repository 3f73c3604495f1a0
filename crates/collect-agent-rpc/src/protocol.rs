//! rstats command protocol.
//!
//! Every request is a JSON document `{"command_id": N, "command_parameters": {...}}`.
//! Replies are free text; only the registration reply has a grammar
//! (`OK <connection_id>` or `KO <reason>`).

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use collect_agent_types::Statistics;

pub const REGISTER: u8 = 1;
pub const SEND_STAT: u8 = 2;
pub const RELOAD: u8 = 3;
pub const REMOVE: u8 = 4;
pub const RELOAD_ALL: u8 = 5;
pub const CHANGE_CONFIG: u8 = 6;
pub const RESTART_RSTATS: u8 = 7;

/// Parameters of the registration command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterParams {
    pub confpath: String,
    pub job_name: String,
    pub agent_name: String,
    pub job_instance_id: u32,
    pub scenario_instance_id: u32,
    pub owner_scenario_instance_id: u32,
    /// Ask rstats to replace an existing registration for this job
    #[serde(rename = "override")]
    pub overwrite: bool,
}

/// Parameters of a statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendStatParams {
    pub connection_id: u32,
    pub timestamp: i64,
    pub statistics: Statistics,
    /// Absent for prepared statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_files: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
}

/// Parameters of commands addressing a single registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub connection_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeConfigParams {
    pub job_instance_id: u32,
    pub scenario_instance_id: u32,
    pub enable_storage: bool,
    pub enable_broadcast: bool,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyParams {}

/// A command understood by rstats
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register(RegisterParams),
    SendStat(SendStatParams),
    Reload(ConnectionParams),
    Remove(ConnectionParams),
    ReloadAll,
    ChangeConfig(ChangeConfigParams),
    RestartRstats,
}

impl Command {
    #[must_use]
    pub fn command_id(&self) -> u8 {
        match self {
            Command::Register(_) => REGISTER,
            Command::SendStat(_) => SEND_STAT,
            Command::Reload(_) => RELOAD,
            Command::Remove(_) => REMOVE,
            Command::ReloadAll => RELOAD_ALL,
            Command::ChangeConfig(_) => CHANGE_CONFIG,
            Command::RestartRstats => RESTART_RSTATS,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register(_) => "register",
            Command::SendStat(_) => "send_stat",
            Command::Reload(_) => "reload",
            Command::Remove(_) => "remove",
            Command::ReloadAll => "reload_all",
            Command::ChangeConfig(_) => "change_config",
            Command::RestartRstats => "restart_rstats",
        }
    }

    /// Parse a command from its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, the id is unknown, or the
    /// parameters do not match the command shape.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize this command to its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Command", 2)?;
        state.serialize_field("command_id", &self.command_id())?;
        match self {
            Command::Register(params) => state.serialize_field("command_parameters", params)?,
            Command::SendStat(params) => state.serialize_field("command_parameters", params)?,
            Command::Reload(params) | Command::Remove(params) => {
                state.serialize_field("command_parameters", params)?;
            }
            Command::ChangeConfig(params) => {
                state.serialize_field("command_parameters", params)?;
            }
            Command::ReloadAll | Command::RestartRstats => {
                state.serialize_field("command_parameters", &EmptyParams {})?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawCommand {
    command_id: u8,
    #[serde(default)]
    command_parameters: Value,
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawCommand::deserialize(deserializer)?;
        let params = raw.command_parameters;
        let command = match raw.command_id {
            REGISTER => Command::Register(serde_json::from_value(params).map_err(D::Error::custom)?),
            SEND_STAT => Command::SendStat(serde_json::from_value(params).map_err(D::Error::custom)?),
            RELOAD => Command::Reload(serde_json::from_value(params).map_err(D::Error::custom)?),
            REMOVE => Command::Remove(serde_json::from_value(params).map_err(D::Error::custom)?),
            RELOAD_ALL => Command::ReloadAll,
            CHANGE_CONFIG => {
                Command::ChangeConfig(serde_json::from_value(params).map_err(D::Error::custom)?)
            }
            RESTART_RSTATS => Command::RestartRstats,
            other => return Err(D::Error::custom(format!("unknown command_id {other}"))),
        };
        Ok(command)
    }
}

/// Outcome of a registration, decoded from the daemon's reply text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterReply {
    /// `OK <id>`; an id of 0 is accepted but unusable
    Accepted { connection_id: u32 },
    /// `KO ...`
    Rejected,
    /// Anything else, including `OK` without an unsigned integer
    Malformed,
}

impl RegisterReply {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.split_whitespace();
        match tokens.next() {
            Some("OK") => match tokens.next().and_then(parse_unsigned) {
                Some(connection_id) => RegisterReply::Accepted { connection_id },
                None => RegisterReply::Malformed,
            },
            Some("KO") => RegisterReply::Rejected,
            _ => RegisterReply::Malformed,
        }
    }

    /// Connection id to store in the session; 0 unless accepted.
    #[must_use]
    pub fn connection_id(self) -> u32 {
        match self {
            RegisterReply::Accepted { connection_id } => connection_id,
            RegisterReply::Rejected | RegisterReply::Malformed => 0,
        }
    }

    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, RegisterReply::Accepted { .. })
    }
}

/// Digits only; `str::parse` would also take a leading `+`.
fn parse_unsigned(token: &str) -> Option<u32> {
    if token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collect_agent_types::StatValue;
    use serde_json::json;

    fn register_params() -> RegisterParams {
        RegisterParams {
            confpath: "/opt/openbach/agent/jobs/fping/fping_rstats_filter.conf".to_string(),
            job_name: "fping".to_string(),
            agent_name: "agent-1".to_string(),
            job_instance_id: 12,
            scenario_instance_id: 4,
            owner_scenario_instance_id: 2,
            overwrite: false,
        }
    }

    #[test]
    fn test_register_serialization() {
        let value = serde_json::to_value(Command::Register(register_params())).unwrap();
        assert_eq!(
            value,
            json!({
                "command_id": 1,
                "command_parameters": {
                    "confpath": "/opt/openbach/agent/jobs/fping/fping_rstats_filter.conf",
                    "job_name": "fping",
                    "agent_name": "agent-1",
                    "job_instance_id": 12,
                    "scenario_instance_id": 4,
                    "owner_scenario_instance_id": 2,
                    "override": false
                }
            })
        );
    }

    #[test]
    fn test_send_stat_omits_empty_suffix() {
        let command = Command::SendStat(SendStatParams {
            connection_id: 3,
            timestamp: 1_500_000_000_000,
            statistics: Statistics::new().with("rtt", 12),
            stored_files: Some(false),
            suffix: String::new(),
        });
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["command_id"], 2);
        assert_eq!(value["command_parameters"]["statistics"]["rtt"], 12);
        assert_eq!(value["command_parameters"]["stored_files"], false);
        assert!(value["command_parameters"].get("suffix").is_none());
    }

    #[test]
    fn test_send_stat_keeps_suffix() {
        let command = Command::SendStat(SendStatParams {
            connection_id: 3,
            timestamp: 10,
            statistics: Statistics::new(),
            stored_files: Some(true),
            suffix: "eth0".to_string(),
        });
        let json = command.to_json().unwrap();
        assert!(json.contains("\"suffix\":\"eth0\""));
    }

    #[test]
    fn test_prepared_stat_omits_stored_files() {
        let command = Command::SendStat(SendStatParams {
            connection_id: 1,
            timestamp: 10,
            statistics: Statistics::new(),
            stored_files: None,
            suffix: String::new(),
        });
        let json = command.to_json().unwrap();
        assert!(!json.contains("stored_files"));
    }

    #[test]
    fn test_parameterless_commands_serialize_empty_object() {
        let json = Command::ReloadAll.to_json().unwrap();
        assert_eq!(json, r#"{"command_id":5,"command_parameters":{}}"#);
        let json = Command::RestartRstats.to_json().unwrap();
        assert_eq!(json, r#"{"command_id":7,"command_parameters":{}}"#);
    }

    #[test]
    fn test_connection_commands() {
        let reload = Command::Reload(ConnectionParams { connection_id: 9 });
        assert_eq!(
            reload.to_json().unwrap(),
            r#"{"command_id":3,"command_parameters":{"connection_id":9}}"#
        );
        let remove = Command::Remove(ConnectionParams { connection_id: 9 });
        assert_eq!(remove.command_id(), REMOVE);
    }

    #[test]
    fn test_change_config_serialization() {
        let command = Command::ChangeConfig(ChangeConfigParams {
            job_instance_id: 5,
            scenario_instance_id: 6,
            enable_storage: true,
            enable_broadcast: false,
        });
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["command_id"], 6);
        assert_eq!(value["command_parameters"]["enable_storage"], true);
        assert_eq!(value["command_parameters"]["enable_broadcast"], false);
    }

    #[test]
    fn test_command_roundtrip_all_kinds() {
        let commands = vec![
            Command::Register(register_params()),
            Command::SendStat(SendStatParams {
                connection_id: 1,
                timestamp: -5,
                statistics: Statistics::new()
                    .with("nested", Statistics::new().with("x", StatValue::Null)),
                stored_files: Some(true),
                suffix: "s".to_string(),
            }),
            Command::Reload(ConnectionParams { connection_id: 2 }),
            Command::Remove(ConnectionParams { connection_id: 2 }),
            Command::ReloadAll,
            Command::ChangeConfig(ChangeConfigParams {
                job_instance_id: 1,
                scenario_instance_id: 2,
                enable_storage: false,
                enable_broadcast: true,
            }),
            Command::RestartRstats,
        ];
        for command in commands {
            let parsed = Command::parse(&command.to_json().unwrap()).unwrap();
            assert_eq!(parsed, command, "{} did not survive", command.name());
        }
    }

    #[test]
    fn test_parse_unknown_command_id() {
        let err = Command::parse(r#"{"command_id":42,"command_parameters":{}}"#).unwrap_err();
        assert!(err.to_string().contains("unknown command_id 42"));
    }

    #[test]
    fn test_parse_wrong_parameters() {
        assert!(Command::parse(r#"{"command_id":3,"command_parameters":{}}"#).is_err());
    }

    #[test]
    fn test_register_reply_ok() {
        let reply = RegisterReply::parse("OK 42");
        assert_eq!(reply, RegisterReply::Accepted { connection_id: 42 });
        assert_eq!(reply.connection_id(), 42);
        assert!(reply.is_accepted());
    }

    #[test]
    fn test_register_reply_ok_zero_is_accepted() {
        let reply = RegisterReply::parse("OK 0");
        assert!(reply.is_accepted());
        assert_eq!(reply.connection_id(), 0);
    }

    #[test]
    fn test_register_reply_tolerates_whitespace() {
        assert_eq!(
            RegisterReply::parse("  OK\t7\n"),
            RegisterReply::Accepted { connection_id: 7 }
        );
    }

    #[test]
    fn test_register_reply_ko() {
        let reply = RegisterReply::parse("KO anything");
        assert_eq!(reply, RegisterReply::Rejected);
        assert_eq!(reply.connection_id(), 0);
    }

    #[test]
    fn test_register_reply_malformed() {
        for text in [
            "garbage",
            "",
            "OK",
            "OK abc",
            "OK -3",
            "OK +5",
            "ok 4",
            "OK 99999999999",
        ] {
            let reply = RegisterReply::parse(text);
            assert_eq!(reply, RegisterReply::Malformed, "{text:?}");
            assert_eq!(reply.connection_id(), 0);
        }
    }
}

//! Introspection shapes served by the HTTP API and returned by the
//! `to_json()` methods of robots and the manager.

use serde::{Deserialize, Serialize};

/// `{name, port, adaptor}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionJson {
    pub name: String,
    pub port: String,
    pub adaptor: String,
}

/// `{name, driver, connection, commands}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceJson {
    pub name: String,
    pub driver: String,
    pub connection: String,
    pub commands: Vec<String>,
}

/// `{name, commands, connections, devices}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotJson {
    pub name: String,
    pub commands: Vec<String>,
    pub connections: Vec<ConnectionJson>,
    pub devices: Vec<DeviceJson>,
}

/// `{robots, commands}` for the whole manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerJson {
    pub robots: Vec<RobotJson>,
    pub commands: Vec<String>,
}

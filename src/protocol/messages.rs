use serde::{Deserialize, Serialize};

pub type RouterId = u32;
pub type Cost = u32;

/// Cost meaning "unreachable", on the wire and in the table.
pub const INFINITY: Cost = 999;

/// Logical peer id of the relay server. Never a valid router id.
pub const RELAY_ID: RouterId = 999;

/// Highest router id a node may use.
pub const MAX_ROUTER_ID: RouterId = 998;

/// Adds two costs, clamping anything at or above `INFINITY` to `INFINITY`.
pub fn saturating_cost(a: Cost, b: Cost) -> Cost {
    a.saturating_add(b).min(INFINITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PacketType {
    Hello,
    Route,
    Quit,
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => PacketType::Hello,
            1 => PacketType::Route,
            2 => PacketType::Quit,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(kind: PacketType) -> Self {
        match kind {
            PacketType::Hello => 0,
            PacketType::Route => 1,
            PacketType::Quit => 2,
            PacketType::Unknown(other) => other,
        }
    }
}

/// One advertisement exchanged with the relay.
///
/// `vector[i]` is the sender's believed minimum cost to router `i`.
/// HELLO and QUIT carry an empty vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvrPacket {
    pub source: RouterId,
    pub dest: RouterId,
    #[serde(rename = "type")]
    pub kind: PacketType,
    #[serde(default)]
    pub vector: Vec<Cost>,
}

impl DvrPacket {
    pub fn hello(router_id: RouterId) -> Self {
        Self {
            source: router_id,
            dest: RELAY_ID,
            kind: PacketType::Hello,
            vector: Vec::new(),
        }
    }

    pub fn route(source: RouterId, dest: RouterId, vector: Vec<Cost>) -> Self {
        Self {
            source,
            dest,
            kind: PacketType::Route,
            vector,
        }
    }

    pub fn quit(source: RouterId) -> Self {
        Self {
            source,
            dest: RELAY_ID,
            kind: PacketType::Quit,
            vector: Vec::new(),
        }
    }

    pub fn is_from_relay(&self) -> bool {
        self.source == RELAY_ID
    }

    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

//! Node, stream and manifest identifiers.
//!
//! A stream id is the plain concatenation `node_id ‖ token ‖ label`. Node ids
//! and tokens have fixed hex widths, so the string form parses back without a
//! separator. The same string is the network routing key and the first input
//! of the segment attestation hash.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};

/// Hex length of a node id (34-byte multihash).
pub const NODE_ID_HEX_LEN: usize = 68;

/// Hex length of a random stream/manifest token (32 bytes).
pub const TOKEN_HEX_LEN: usize = 64;

/// Multihash prefix for a sha2-256 digest of 32 bytes.
const MULTIHASH_PREFIX: [u8; 2] = [0x12, 0x20];

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_HEX_LEN / 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex-encoded peer identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap a hex node id.
    pub fn new(id: impl Into<String>) -> TypesResult<Self> {
        let id = id.into().to_ascii_lowercase();
        if id.len() != NODE_ID_HEX_LEN || !is_hex(&id) {
            return Err(TypesError::InvalidNodeId(id));
        }
        Ok(Self(id))
    }

    /// Build a node id from raw peer id bytes.
    pub fn from_peer_bytes(bytes: &[u8]) -> TypesResult<Self> {
        Self::new(hex::encode(bytes))
    }

    /// Generate a random node id with a sha2-256 multihash prefix.
    pub fn random() -> Self {
        let mut bytes = [0u8; NODE_ID_HEX_LEN / 2];
        bytes[..2].copy_from_slice(&MULTIHASH_PREFIX);
        OsRng.fill_bytes(&mut bytes[2..]);
        Self(hex::encode(bytes))
    }

    /// Hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Identifier of a master playlist: origin node plus random token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManifestId {
    node: NodeId,
    token: String,
}

impl ManifestId {
    /// Mint a fresh manifest id for `node`.
    pub fn mint(node: &NodeId) -> Self {
        Self {
            node: node.clone(),
            token: random_token(),
        }
    }

    /// Build from an existing token.
    pub fn with_token(node: &NodeId, token: &str) -> TypesResult<Self> {
        if token.len() != TOKEN_HEX_LEN || !is_hex(token) {
            return Err(TypesError::InvalidManifestId(format!("{node}{token}")));
        }
        Ok(Self {
            node: node.clone(),
            token: token.to_ascii_lowercase(),
        })
    }

    /// Origin node.
    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    /// Random token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.node, self.token)
    }
}

impl FromStr for ManifestId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NODE_ID_HEX_LEN + TOKEN_HEX_LEN || !s.is_char_boundary(NODE_ID_HEX_LEN) {
            return Err(TypesError::InvalidManifestId(s.to_string()));
        }
        let (node, token) = s.split_at(NODE_ID_HEX_LEN);
        let node = NodeId::new(node).map_err(|_| TypesError::InvalidManifestId(s.to_string()))?;
        Self::with_token(&node, token)
    }
}

impl TryFrom<String> for ManifestId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ManifestId> for String {
    fn from(id: ManifestId) -> Self {
        id.to_string()
    }
}

/// Identifier of a single video stream.
///
/// Immutable once minted. Two streams from different origin nodes never
/// compare equal, even when their labels match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId {
    node: NodeId,
    token: String,
    label: String,
}

impl StreamId {
    /// Mint a new stream id with a random token.
    pub fn mint(node: &NodeId, label: &str) -> Self {
        Self {
            node: node.clone(),
            token: random_token(),
            label: label.to_string(),
        }
    }

    /// Derive a stream id belonging to an existing manifest.
    pub fn for_manifest(manifest: &ManifestId, label: &str) -> Self {
        Self {
            node: manifest.node.clone(),
            token: manifest.token.clone(),
            label: label.to_string(),
        }
    }

    /// Build from explicit parts.
    pub fn from_parts(node: &NodeId, token: &str, label: &str) -> TypesResult<Self> {
        if token.len() != TOKEN_HEX_LEN || !is_hex(token) {
            return Err(TypesError::InvalidStreamId(format!("{node}{token}{label}")));
        }
        Ok(Self {
            node: node.clone(),
            token: token.to_ascii_lowercase(),
            label: label.to_string(),
        })
    }

    /// Origin node of the stream.
    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    /// Random token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Human label (may be empty).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Manifest this stream belongs to.
    pub fn manifest_id(&self) -> ManifestId {
        ManifestId {
            node: self.node.clone(),
            token: self.token.clone(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.node, self.token, self.label)
    }
}

impl FromStr for StreamId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = NODE_ID_HEX_LEN + TOKEN_HEX_LEN;
        if s.len() < prefix
            || !s.is_char_boundary(NODE_ID_HEX_LEN)
            || !s.is_char_boundary(prefix)
        {
            return Err(TypesError::InvalidStreamId(s.to_string()));
        }
        let (node, rest) = s.split_at(NODE_ID_HEX_LEN);
        let (token, label) = rest.split_at(TOKEN_HEX_LEN);
        let node = NodeId::new(node).map_err(|_| TypesError::InvalidStreamId(s.to_string()))?;
        Self::from_parts(&node, token, label)
    }
}

impl TryFrom<String> for StreamId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

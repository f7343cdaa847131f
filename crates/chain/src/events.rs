//! Event signatures and typed decoding of the logs the node watches.

use ethabi::ethereum_types::U256;
use ethabi::{Event, EventParam, LogParam, ParamType, RawLog, Token};
use sp_core::hashing::keccak_256;
use sp_core::{H160, H256};

use crate::error::{ChainError, ChainResult};
use crate::ledger::{Log, TxHash};

/// Solidity signature of the round transition event.
pub const NEW_ROUND_SIGNATURE: &str = "NewRound(uint256)";

/// Solidity signature of the job creation event.
pub const NEW_JOB_SIGNATURE: &str = "NewJob(address,uint256,string,string,uint256,uint256)";

/// Topic of an event signature.
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak_256(signature.as_bytes()))
}

/// Indexed-address topic: the address left-padded to 32 bytes.
pub fn address_topic(address: &H160) -> H256 {
    H256::from_slice(&ethabi::encode(&[Token::Address(ethabi::Address::from(address.0))]))
}

fn param(name: &str, kind: ParamType, indexed: bool) -> EventParam {
    EventParam {
        name: name.to_string(),
        kind,
        indexed,
    }
}

fn new_round_abi() -> Event {
    Event {
        name: "NewRound".to_string(),
        inputs: vec![param("round", ParamType::Uint(256), false)],
        anonymous: false,
    }
}

fn new_job_abi() -> Event {
    Event {
        name: "NewJob".to_string(),
        inputs: vec![
            param("broadcaster", ParamType::Address, true),
            param("jobId", ParamType::Uint(256), false),
            param("streamId", ParamType::String, false),
            param("transcodingOptions", ParamType::String, false),
            param("maxPricePerSegment", ParamType::Uint(256), false),
            param("creationBlock", ParamType::Uint(256), false),
        ],
        anonymous: false,
    }
}

/// Parse `log` against `event`, checking its signature topic.
fn parse(event: &Event, log: &Log) -> ChainResult<Vec<LogParam>> {
    let raw = RawLog {
        topics: log.topics.iter().map(|t| ethabi::Hash::from(t.0)).collect(),
        data: log.data.clone(),
    };
    event
        .parse_log(raw)
        .map(|parsed| parsed.params)
        .map_err(|e| ChainError::Decode(format!("{} log: {e}", event.name)))
}

fn take<'a>(params: &'a [LogParam], name: &str) -> ChainResult<&'a Token> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .ok_or_else(|| ChainError::Decode(format!("missing {name}")))
}

fn uint(params: &[LogParam], name: &str, bits: usize) -> ChainResult<U256> {
    match take(params, name)? {
        Token::Uint(value) if value.bits() <= bits => Ok(*value),
        Token::Uint(_) => Err(ChainError::Decode(format!("{name} overflows u{bits}"))),
        other => Err(ChainError::Decode(format!("{name} is not a uint: {other:?}"))),
    }
}

fn uint64(params: &[LogParam], name: &str) -> ChainResult<u64> {
    uint(params, name, 64).map(|v| v.low_u64())
}

fn uint128(params: &[LogParam], name: &str) -> ChainResult<u128> {
    uint(params, name, 128).map(|v| v.low_u128())
}

fn string(params: &[LogParam], name: &str) -> ChainResult<String> {
    match take(params, name)? {
        Token::String(value) => Ok(value.clone()),
        other => Err(ChainError::Decode(format!("{name} is not a string: {other:?}"))),
    }
}

fn address(params: &[LogParam], name: &str) -> ChainResult<H160> {
    match take(params, name)? {
        Token::Address(value) => Ok(H160::from(value.0)),
        other => Err(ChainError::Decode(format!("{name} is not an address: {other:?}"))),
    }
}

/// `NewRound(uint256 round)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRoundEvent {
    /// Round that just started.
    pub round: u64,
}

impl NewRoundEvent {
    /// Decode from a log.
    pub fn decode(log: &Log) -> ChainResult<Self> {
        let params = parse(&new_round_abi(), log)?;
        Ok(Self {
            round: uint64(&params, "round")?,
        })
    }

    /// Encode as a log emitted by `contract`.
    pub fn to_log(&self, contract: H160, block_number: u64, tx: TxHash) -> Log {
        Log {
            address: contract,
            topics: vec![event_topic(NEW_ROUND_SIGNATURE)],
            data: ethabi::encode(&[Token::Uint(U256::from(self.round))]),
            block_number,
            tx,
        }
    }
}

/// `NewJob(address indexed broadcaster, uint256 jobId, string streamId,
/// string transcodingOptions, uint256 maxPricePerSegment, uint256 creationBlock)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobEvent {
    /// Job owner.
    pub broadcaster: H160,
    /// Job id assigned by the jobs contract.
    pub job_id: u64,
    /// Stream id string.
    pub stream_id: String,
    /// Option fingerprint hex.
    pub transcoding_options: String,
    /// Price ceiling per segment.
    pub max_price_per_segment: u128,
    /// Block the job was created in.
    pub creation_block: u64,
}

impl NewJobEvent {
    /// Decode from a log.
    pub fn decode(log: &Log) -> ChainResult<Self> {
        let params = parse(&new_job_abi(), log)?;
        Ok(Self {
            broadcaster: address(&params, "broadcaster")?,
            job_id: uint64(&params, "jobId")?,
            stream_id: string(&params, "streamId")?,
            transcoding_options: string(&params, "transcodingOptions")?,
            max_price_per_segment: uint128(&params, "maxPricePerSegment")?,
            creation_block: uint64(&params, "creationBlock")?,
        })
    }

    /// Encode as a log emitted by `contract`.
    pub fn to_log(&self, contract: H160, tx: TxHash) -> Log {
        let data = ethabi::encode(&[
            Token::Uint(U256::from(self.job_id)),
            Token::String(self.stream_id.clone()),
            Token::String(self.transcoding_options.clone()),
            Token::Uint(U256::from(self.max_price_per_segment)),
            Token::Uint(U256::from(self.creation_block)),
        ]);

        Log {
            address: contract,
            topics: vec![event_topic(NEW_JOB_SIGNATURE), address_topic(&self.broadcaster)],
            data,
            block_number: self.creation_block,
            tx,
        }
    }
}

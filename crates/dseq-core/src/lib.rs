//! # dseq-core
//!
//! Deterministic transaction sequencer driven by a consensus engine.
//!
//! ## Architecture
//!
//! ```text
//! consensus engine
//!        |  Request / Response, one phase at a time
//!        v
//! +-------------------+   FinalizeBlock   +-----------------------+
//! |     Sequencer     | ----------------> |  AtomicStreamWriter   |
//! |  (phase protocol) |  start / append / |  (entry log)          |
//! |                   |  commit/rollback  +-----------------------+
//! |                   |      Commit       +-----------------------+
//! |                   | ----------------> |  StateStore           |
//! |                   |                   +-----------------------+
//! |                   |      Commit       +-----------------------+
//! |                   | ----------------> |  SequenceLedger       |
//! +-------------------+                   +-----------------------+
//! ```
//!
//! Per height the phases run PrepareProposal, ProcessProposal, FinalizeBlock,
//! Commit. FinalizeBlock writes the block's entries as one atomic operation
//! and stages the next state; Commit makes it durable. The fingerprint
//! replicas compare is the 8-byte big-endian count of committed transactions.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod error;
mod ledger;
mod phase;
mod policy;
mod sequencer;

pub use builder::{open_state_store, SequencerBuilder};
pub use error::{SequencerError, SequencerResult};
pub use ledger::{SequenceLedger, SEQUENCE_FILE};
pub use phase::{
    CheckTxKind, CheckTxRequest, CheckTxResponse, CommitResponse, ExecTxResult,
    ExtendVoteRequest, ExtendVoteResponse, FinalizeBlockRequest, FinalizeBlockResponse,
    InfoRequest, InfoResponse, InitChainRequest, InitChainResponse, Misbehavior,
    MisbehaviorKind, Phase, PrepareProposalRequest, PrepareProposalResponse,
    ProcessProposalRequest, ProcessProposalResponse, QueryRequest, QueryResponse, Request,
    Response, VerifyVoteExtensionRequest, VerifyVoteExtensionResponse, CODE_OK, CODE_REJECTED,
};
pub use policy::{
    AcceptAll, AdmissionPolicy, MaxTxBytes, OrderingPolicy, PreserveOrder, RandomOrder, Verdict,
};
pub use sequencer::{block_digest, Sequencer, APP_VERSION, PROTOCOL_VERSION};

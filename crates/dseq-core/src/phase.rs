//! Consensus-facing phase protocol
//!
//! Every phase the consensus engine can invoke is a [`Phase`] variant with a
//! matching [`Request`] and [`Response`] variant. [`Phase::default_response`]
//! is the table of well-formed empty answers; phases the sequencer does not
//! use are answered from it.

use crate::policy::Verdict;
use bytes::Bytes;
use dseq_primitives::{Address, Transaction, H256};
use dseq_storage::FINGERPRINT_LEN;

/// Result code for success
pub const CODE_OK: u32 = 0;

/// Result code for a transaction refused by the admission policy
pub const CODE_REJECTED: u32 = 1;

/// Protocol phases, in per-height order where applicable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Chain genesis
    InitChain,
    /// Proposer builds the block's transaction list
    PrepareProposal,
    /// Validators vet a proposed block
    ProcessProposal,
    /// Decided block is applied
    FinalizeBlock,
    /// Vote extension creation (unused)
    ExtendVote,
    /// Vote extension verification (unused)
    VerifyVoteExtension,
    /// Finalized state is made durable
    Commit,
    /// Mempool admission
    CheckTx,
    /// State query
    Query,
    /// Handshake / status
    Info,
}

impl Phase {
    /// All phases
    pub const ALL: [Phase; 10] = [
        Phase::InitChain,
        Phase::PrepareProposal,
        Phase::ProcessProposal,
        Phase::FinalizeBlock,
        Phase::ExtendVote,
        Phase::VerifyVoteExtension,
        Phase::Commit,
        Phase::CheckTx,
        Phase::Query,
        Phase::Info,
    ];

    /// Phase name, used in logs
    pub fn name(self) -> &'static str {
        match self {
            Phase::InitChain => "init_chain",
            Phase::PrepareProposal => "prepare_proposal",
            Phase::ProcessProposal => "process_proposal",
            Phase::FinalizeBlock => "finalize_block",
            Phase::ExtendVote => "extend_vote",
            Phase::VerifyVoteExtension => "verify_vote_extension",
            Phase::Commit => "commit",
            Phase::CheckTx => "check_tx",
            Phase::Query => "query",
            Phase::Info => "info",
        }
    }

    /// Whether the phase may change sequencer state
    pub fn is_mutating(self) -> bool {
        matches!(self, Phase::FinalizeBlock | Phase::Commit)
    }

    /// Well-formed empty response for the phase
    pub fn default_response(self) -> Response {
        match self {
            Phase::InitChain => Response::InitChain(InitChainResponse::default()),
            Phase::PrepareProposal => Response::PrepareProposal(PrepareProposalResponse::default()),
            Phase::ProcessProposal => Response::ProcessProposal(ProcessProposalResponse::default()),
            Phase::FinalizeBlock => Response::FinalizeBlock(FinalizeBlockResponse::default()),
            Phase::ExtendVote => Response::ExtendVote(ExtendVoteResponse::default()),
            Phase::VerifyVoteExtension => {
                Response::VerifyVoteExtension(VerifyVoteExtensionResponse::default())
            }
            Phase::Commit => Response::Commit(CommitResponse::default()),
            Phase::CheckTx => Response::CheckTx(CheckTxResponse::default()),
            Phase::Query => Response::Query(QueryResponse::default()),
            Phase::Info => Response::Info(InfoResponse::default()),
        }
    }
}

// ==================== Requests ====================

/// Chain genesis parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitChainRequest {
    /// Chain identifier
    pub chain_id: String,
    /// First height the chain will produce
    pub initial_height: u64,
}

/// Candidate transactions for a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareProposalRequest {
    /// Height being proposed
    pub height: u64,
    /// Transactions in mempool order
    pub txs: Vec<Transaction>,
}

/// A block proposed by another validator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessProposalRequest {
    /// Height being proposed
    pub height: u64,
    /// Proposed transactions, in proposed order
    pub txs: Vec<Transaction>,
    /// Proposer identity
    pub proposer: Address,
}

/// Kind of reported validator misbehavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisbehaviorKind {
    /// Two conflicting votes at one height and round
    DuplicateVote,
    /// Attack against light clients
    LightClientAttack,
}

/// Reported validator misbehavior. Accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Misbehavior {
    /// Kind of misbehavior
    pub kind: MisbehaviorKind,
    /// Offending validator
    pub validator: Address,
    /// Height of the offence
    pub height: u64,
}

/// A decided block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeBlockRequest {
    /// Block height
    pub height: u64,
    /// Block hash assigned by consensus
    pub hash: H256,
    /// Ordered transactions
    pub txs: Vec<Transaction>,
    /// Proposer identity
    pub proposer: Address,
    /// Misbehavior reports
    pub misbehavior: Vec<Misbehavior>,
}

/// Vote extension request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendVoteRequest {
    /// Height being voted on
    pub height: u64,
    /// Block hash being voted on
    pub hash: H256,
}

/// Vote extension verification request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyVoteExtensionRequest {
    /// Height being voted on
    pub height: u64,
    /// Validator that produced the extension
    pub validator: Address,
    /// Extension bytes
    pub vote_extension: Bytes,
}

/// Whether a CheckTx call is a first admission or a post-commit recheck
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckTxKind {
    /// First time the transaction is seen
    #[default]
    New,
    /// Recheck after a commit
    Recheck,
}

/// Mempool admission request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckTxRequest {
    /// Candidate transaction
    pub tx: Transaction,
    /// New or recheck
    pub kind: CheckTxKind,
}

/// State query request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Query path
    pub path: String,
    /// Query payload
    pub data: Bytes,
    /// Height to query at, 0 for latest
    pub height: u64,
}

/// Status request sent on handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoRequest {
    /// Consensus engine version
    pub version: String,
}

/// A request for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// InitChain
    InitChain(InitChainRequest),
    /// PrepareProposal
    PrepareProposal(PrepareProposalRequest),
    /// ProcessProposal
    ProcessProposal(ProcessProposalRequest),
    /// FinalizeBlock
    FinalizeBlock(FinalizeBlockRequest),
    /// ExtendVote
    ExtendVote(ExtendVoteRequest),
    /// VerifyVoteExtension
    VerifyVoteExtension(VerifyVoteExtensionRequest),
    /// Commit
    Commit,
    /// CheckTx
    CheckTx(CheckTxRequest),
    /// Query
    Query(QueryRequest),
    /// Info
    Info(InfoRequest),
}

impl Request {
    /// Phase this request belongs to
    pub fn phase(&self) -> Phase {
        match self {
            Request::InitChain(_) => Phase::InitChain,
            Request::PrepareProposal(_) => Phase::PrepareProposal,
            Request::ProcessProposal(_) => Phase::ProcessProposal,
            Request::FinalizeBlock(_) => Phase::FinalizeBlock,
            Request::ExtendVote(_) => Phase::ExtendVote,
            Request::VerifyVoteExtension(_) => Phase::VerifyVoteExtension,
            Request::Commit => Phase::Commit,
            Request::CheckTx(_) => Phase::CheckTx,
            Request::Query(_) => Phase::Query,
            Request::Info(_) => Phase::Info,
        }
    }
}

// ==================== Responses ====================

/// InitChain acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitChainResponse {}

/// Transactions to propose, in sequenced order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareProposalResponse {
    /// Reordered transactions
    pub txs: Vec<Transaction>,
}

/// Verdict on a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessProposalResponse {
    /// Accept or reject
    pub status: Verdict,
}

/// Per-transaction result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecTxResult {
    /// Result code, [`CODE_OK`] on success
    pub code: u32,
}

impl ExecTxResult {
    /// Successful result
    pub fn ok() -> Self {
        Self { code: CODE_OK }
    }
}

/// Outcome of finalizing a block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeBlockResponse {
    /// One result per transaction, in block order
    pub tx_results: Vec<ExecTxResult>,
    /// Fingerprint of the state after this block
    pub app_hash: [u8; FINGERPRINT_LEN],
}

/// Vote extension (always empty)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendVoteResponse {
    /// Extension bytes
    pub vote_extension: Bytes,
}

/// Vote extension verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyVoteExtensionResponse {
    /// Accept or reject
    pub status: Verdict,
}

/// Commit acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResponse {
    /// Blocks below this height may be pruned by consensus; 0 keeps all
    pub retain_height: u64,
}

/// Admission result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckTxResponse {
    /// [`CODE_OK`] or [`CODE_REJECTED`]
    pub code: u32,
    /// Reason for a rejection
    pub log: String,
}

impl CheckTxResponse {
    /// Whether the transaction was admitted
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Query result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    /// Result code
    pub code: u32,
    /// Result bytes
    pub value: Bytes,
    /// Height the result refers to
    pub height: u64,
}

/// Sequencer status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoResponse {
    /// JSON `{"size":N,"height":H}`
    pub data: String,
    /// Phase protocol version
    pub version: String,
    /// Application version
    pub app_version: u64,
    /// Last committed height
    pub last_block_height: u64,
    /// Fingerprint of the last committed state
    pub last_block_app_hash: [u8; FINGERPRINT_LEN],
}

/// A response for one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// InitChain
    InitChain(InitChainResponse),
    /// PrepareProposal
    PrepareProposal(PrepareProposalResponse),
    /// ProcessProposal
    ProcessProposal(ProcessProposalResponse),
    /// FinalizeBlock
    FinalizeBlock(FinalizeBlockResponse),
    /// ExtendVote
    ExtendVote(ExtendVoteResponse),
    /// VerifyVoteExtension
    VerifyVoteExtension(VerifyVoteExtensionResponse),
    /// Commit
    Commit(CommitResponse),
    /// CheckTx
    CheckTx(CheckTxResponse),
    /// Query
    Query(QueryResponse),
    /// Info
    Info(InfoResponse),
}

impl Response {
    /// Phase this response belongs to
    pub fn phase(&self) -> Phase {
        match self {
            Response::InitChain(_) => Phase::InitChain,
            Response::PrepareProposal(_) => Phase::PrepareProposal,
            Response::ProcessProposal(_) => Phase::ProcessProposal,
            Response::FinalizeBlock(_) => Phase::FinalizeBlock,
            Response::ExtendVote(_) => Phase::ExtendVote,
            Response::VerifyVoteExtension(_) => Phase::VerifyVoteExtension,
            Response::Commit(_) => Phase::Commit,
            Response::CheckTx(_) => Phase::CheckTx,
            Response::Query(_) => Phase::Query,
            Response::Info(_) => Phase::Info,
        }
    }
}

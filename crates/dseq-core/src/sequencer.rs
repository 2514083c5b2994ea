//! Block lifecycle controller

use crate::error::{SequencerError, SequencerResult};
use crate::ledger::SequenceLedger;
use crate::phase::{
    CheckTxRequest, CheckTxResponse, CommitResponse, ExecTxResult, FinalizeBlockRequest,
    FinalizeBlockResponse, InfoRequest, InfoResponse, InitChainRequest, InitChainResponse,
    PrepareProposalRequest, PrepareProposalResponse, ProcessProposalRequest,
    ProcessProposalResponse, QueryRequest, QueryResponse, Request, Response, CODE_OK,
    CODE_REJECTED,
};
use crate::policy::{AdmissionPolicy, OrderingPolicy, Verdict};
use dseq_primitives::{keccak256, Address, BlockHeight, Transaction};
use dseq_storage::{AppState, StateStore};
use dseq_stream::{
    block_end_marker, block_marker, AtomicStreamWriter, EntryType, StreamError, BLOCK_DIGEST_LEN,
};

/// Phase protocol version reported by Info
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Application version reported by Info
pub const APP_VERSION: u64 = 1;

/// Content digest sealed into a block's BlockEnd entry: keccak256 over the
/// keccak256 of each transaction, in block order
pub fn block_digest(txs: &[Transaction]) -> [u8; BLOCK_DIGEST_LEN] {
    let mut preimage = Vec::with_capacity(txs.len() * BLOCK_DIGEST_LEN);
    for tx in txs {
        preimage.extend_from_slice(keccak256(tx).as_bytes());
    }
    *keccak256(&preimage).as_bytes()
}

/// A finalized block waiting for Commit.
///
/// Created by FinalizeBlock and consumed by Commit; there is never more than one.
#[derive(Debug)]
struct PendingBlock {
    height: BlockHeight,
    txs: Vec<Transaction>,
    next: AppState,
}

/// Deterministic sequencer driven by the consensus engine, one phase at a time.
///
/// FinalizeBlock writes the block to the entry log as one atomic operation and
/// stages the resulting state; Commit makes that state durable and records the
/// block's transactions in the sequence ledger.
pub struct Sequencer<W: AtomicStreamWriter> {
    identity: String,
    address: Address,
    store: StateStore,
    stream: W,
    ledger: Option<SequenceLedger>,
    ordering: Box<dyn OrderingPolicy + Send>,
    admission: Box<dyn AdmissionPolicy + Send>,
    pending: Option<PendingBlock>,
    halted: bool,
}

impl<W: AtomicStreamWriter> Sequencer<W> {
    pub(crate) fn from_parts(
        identity: String,
        address: Address,
        store: StateStore,
        stream: W,
        ledger: Option<SequenceLedger>,
        ordering: Box<dyn OrderingPolicy + Send>,
        admission: Box<dyn AdmissionPolicy + Send>,
    ) -> Self {
        Self {
            identity,
            address,
            store,
            stream,
            ledger,
            ordering,
            admission,
            pending: None,
            halted: false,
        }
    }

    // ==================== Phases ====================

    /// Acknowledge chain genesis. No state changes.
    pub fn init_chain(&self, req: &InitChainRequest) -> InitChainResponse {
        tracing::info!(
            chain_id = %req.chain_id,
            initial_height = req.initial_height,
            "init chain"
        );
        InitChainResponse::default()
    }

    /// Order the proposal's transactions with the ordering policy
    pub fn prepare_proposal(&self, req: PrepareProposalRequest) -> PrepareProposalResponse {
        let count = req.txs.len();
        let txs = self.ordering.order(req.txs);
        tracing::debug!(height = req.height, txs = count, "prepare proposal");
        PrepareProposalResponse { txs }
    }

    /// Vet a proposal with the admission policy
    pub fn process_proposal(&self, req: &ProcessProposalRequest) -> ProcessProposalResponse {
        let status = self.admission.validate_batch(&req.txs, &req.proposer);
        tracing::debug!(
            height = req.height,
            txs = req.txs.len(),
            proposer = %req.proposer,
            accepted = status.is_accept(),
            "process proposal"
        );
        ProcessProposalResponse { status }
    }

    /// Write a decided block to the entry log and stage its state.
    ///
    /// Empty blocks open no atomic operation. A block the log already holds,
    /// left by a crash between FinalizeBlock and Commit, is not written again;
    /// any other block at or below the log's last height halts the sequencer.
    pub fn finalize_block(
        &mut self,
        req: FinalizeBlockRequest,
    ) -> SequencerResult<FinalizeBlockResponse> {
        if self.halted {
            return Err(SequencerError::Halted);
        }
        if let Some(pending) = &self.pending {
            return Err(SequencerError::PhaseOrder(format!(
                "finalize at height {} while height {} awaits commit",
                req.height, pending.height
            )));
        }

        let FinalizeBlockRequest {
            height,
            txs,
            misbehavior,
            ..
        } = req;
        tracing::debug!(
            height,
            txs = txs.len(),
            misbehavior = misbehavior.len(),
            "finalize block"
        );

        let digest = block_digest(&txs);
        match self.stream.last_block() {
            Some(logged) if logged.height >= height => {
                if logged.height != height || logged.digest != digest {
                    tracing::error!(
                        height,
                        logged = logged.height,
                        "entry log holds a different block at this height"
                    );
                    self.halted = true;
                    return Err(SequencerError::LogDiverged {
                        height,
                        logged: logged.height,
                    });
                }
                tracing::warn!(height, "block already in entry log, skipping write");
            }
            _ if txs.is_empty() => {}
            _ => self.write_block(height, &digest, &txs)?,
        }

        let next = self.store.state().advance(height, txs.len());
        let response = FinalizeBlockResponse {
            tx_results: vec![ExecTxResult::ok(); txs.len()],
            app_hash: next.fingerprint(),
        };
        self.pending = Some(PendingBlock { height, txs, next });
        Ok(response)
    }

    /// Persist the staged state and record the block in the sequence ledger
    pub fn commit(&mut self) -> SequencerResult<CommitResponse> {
        if self.halted {
            return Err(SequencerError::Halted);
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| SequencerError::PhaseOrder("commit without a finalized block".into()))?;

        if let Err(e) = self.store.commit(pending.next) {
            tracing::error!(height = pending.height, error = %e, "failed to persist state");
            self.pending = Some(pending);
            return Err(SequencerError::Storage(e));
        }

        if let Some(ledger) = self.ledger.as_mut() {
            for tx in &pending.txs {
                ledger.record(tx);
            }
            ledger.flush();
        }

        tracing::info!(
            height = pending.height,
            txs = pending.txs.len(),
            size = pending.next.size,
            "committed block"
        );
        Ok(CommitResponse::default())
    }

    /// Mempool admission gate
    pub fn check_tx(&self, req: &CheckTxRequest) -> CheckTxResponse {
        match self.admission.check_tx(&req.tx) {
            Verdict::Accept => CheckTxResponse {
                code: CODE_OK,
                log: String::new(),
            },
            Verdict::Reject => CheckTxResponse {
                code: CODE_REJECTED,
                log: "rejected by admission policy".into(),
            },
        }
    }

    /// State query. Nothing is queryable, so the answer is always empty.
    pub fn query(&self, req: &QueryRequest) -> QueryResponse {
        tracing::debug!(path = %req.path, "query");
        QueryResponse::default()
    }

    /// Last committed height and fingerprint
    pub fn info(&self, req: &InfoRequest) -> InfoResponse {
        let state = self.store.state();
        tracing::debug!(engine_version = %req.version, height = state.height, "info");
        InfoResponse {
            data: serde_json::to_string(&state).unwrap_or_default(),
            version: PROTOCOL_VERSION.to_string(),
            app_version: APP_VERSION,
            last_block_height: state.height,
            last_block_app_hash: state.fingerprint(),
        }
    }

    /// Dispatch one request to its phase
    pub fn handle(&mut self, request: Request) -> SequencerResult<Response> {
        let phase = request.phase();
        let response = match request {
            Request::InitChain(req) => Response::InitChain(self.init_chain(&req)),
            Request::PrepareProposal(req) => Response::PrepareProposal(self.prepare_proposal(req)),
            Request::ProcessProposal(req) => {
                Response::ProcessProposal(self.process_proposal(&req))
            }
            Request::FinalizeBlock(req) => Response::FinalizeBlock(self.finalize_block(req)?),
            Request::ExtendVote(_) | Request::VerifyVoteExtension(_) => phase.default_response(),
            Request::Commit => Response::Commit(self.commit()?),
            Request::CheckTx(req) => Response::CheckTx(self.check_tx(&req)),
            Request::Query(req) => Response::Query(self.query(&req)),
            Request::Info(req) => Response::Info(self.info(&req)),
        };
        Ok(response)
    }

    // ==================== Entry log ====================

    fn write_block(
        &mut self,
        height: BlockHeight,
        digest: &[u8; BLOCK_DIGEST_LEN],
        txs: &[Transaction],
    ) -> SequencerResult<()> {
        self.stream
            .start_atomic_op()
            .map_err(SequencerError::LogWrite)?;

        let written = self
            .append_block(height, digest, txs)
            .and_then(|()| self.stream.commit_atomic_op());
        match written {
            Ok(()) => Ok(()),
            Err(cause) => Err(self.abort_block(height, cause)),
        }
    }

    fn append_block(
        &mut self,
        height: BlockHeight,
        digest: &[u8; BLOCK_DIGEST_LEN],
        txs: &[Transaction],
    ) -> Result<(), StreamError> {
        let first = self.stream.append_entry(EntryType::BlockStart, &block_marker(height))?;
        for tx in txs {
            self.stream.append_entry(EntryType::Tx, tx)?;
        }
        let last = self
            .stream
            .append_entry(EntryType::BlockEnd, &block_end_marker(height, digest))?;
        tracing::debug!(height, first, last, "block entries appended");
        Ok(())
    }

    fn abort_block(&mut self, height: BlockHeight, cause: StreamError) -> SequencerError {
        match self.stream.rollback_atomic_op() {
            Ok(()) => {
                tracing::warn!(height, error = %cause, "block write failed, rolled back");
                SequencerError::LogWrite(cause)
            }
            Err(rollback) => {
                tracing::error!(
                    height,
                    error = %cause,
                    rollback_error = %rollback,
                    "rollback failed, entry log state unknown"
                );
                self.halted = true;
                SequencerError::RollbackFailed { cause, rollback }
            }
        }
    }

    // ==================== Accessors ====================

    /// Last committed state
    pub fn state(&self) -> AppState {
        self.store.state()
    }

    /// Fingerprint of the last committed state
    pub fn fingerprint(&self) -> [u8; dseq_storage::FINGERPRINT_LEN] {
        self.store.fingerprint()
    }

    /// Height of the block awaiting commit
    pub fn pending_height(&self) -> Option<BlockHeight> {
        self.pending.as_ref().map(|p| p.height)
    }

    /// Whether an unrecoverable log failure or divergence stopped the sequencer
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Node moniker
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sequencer address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The entry log writer
    pub fn stream(&self) -> &W {
        &self.stream
    }

    /// Mutable access to the entry log writer
    pub fn stream_mut(&mut self) -> &mut W {
        &mut self.stream
    }

    /// Flush the ledger and close the state store
    pub fn close(&mut self) -> SequencerResult<()> {
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.flush();
        }
        self.store.close().map_err(SequencerError::Storage)
    }
}

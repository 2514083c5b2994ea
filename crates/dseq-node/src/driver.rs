//! Single-replica driver standing in for the consensus engine
//!
//! Transactions arrive on stdin, one per line. On every block-time tick the
//! driver runs PrepareProposal, ProcessProposal, FinalizeBlock and Commit for
//! the next height over the queued transactions. Stdin is read no faster than
//! the mempool drains.

use anyhow::Result;
use dseq_core::{
    CheckTxRequest, FinalizeBlockRequest, InfoRequest, PrepareProposalRequest,
    ProcessProposalRequest, Sequencer, SequencerError, SequencerResult, Verdict,
};
use dseq_primitives::{keccak256, Address, BlockHeight, Transaction};
use dseq_stream::AtomicStreamWriter;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::interval;

/// Parse one input line into a transaction.
///
/// `0x`-prefixed lines are hex-decoded; anything else is taken as raw bytes.
/// Blank lines yield `None`.
pub fn parse_tx(line: &str) -> Option<Result<Transaction, hex::FromHexError>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    match line.strip_prefix("0x") {
        Some(hex_str) => Some(hex::decode(hex_str).map(Transaction::from)),
        None => Some(Ok(Transaction::copy_from_slice(line.as_bytes()))),
    }
}

/// Drives a [`Sequencer`] through the phase protocol, one height per tick
pub struct LocalDriver<W: AtomicStreamWriter> {
    sequencer: Sequencer<W>,
    mempool: VecDeque<Transaction>,
    proposer: Address,
    height: BlockHeight,
    max_block_txs: usize,
    mempool_size: usize,
}

impl<W: AtomicStreamWriter> LocalDriver<W> {
    /// Create a driver that continues after the sequencer's last committed height
    pub fn new(sequencer: Sequencer<W>, max_block_txs: usize, mempool_size: usize) -> Self {
        let info = sequencer.info(&InfoRequest::default());
        let proposer = *sequencer.address();
        tracing::info!(
            height = info.last_block_height,
            app_hash = %hex::encode(info.last_block_app_hash),
            "resuming from last committed block"
        );
        Self {
            sequencer,
            mempool: VecDeque::new(),
            proposer,
            height: info.last_block_height,
            max_block_txs,
            mempool_size,
        }
    }

    /// Height of a block the entry log holds but the state store never
    /// committed, left by a crash between FinalizeBlock and Commit
    pub fn uncommitted_log_height(&self) -> Option<BlockHeight> {
        self.sequencer
            .stream()
            .last_block_height()
            .filter(|logged| *logged > self.height)
    }

    /// Finalize and commit the block recovered from the entry log at `height`.
    ///
    /// The transactions must be the logged ones, in log order; the sequencer
    /// refuses anything else.
    pub fn replay(&mut self, height: BlockHeight, txs: Vec<Transaction>) -> SequencerResult<()> {
        if height != self.height + 1 {
            return Err(SequencerError::LogDiverged {
                height: self.height + 1,
                logged: height,
            });
        }
        let count = txs.len();
        self.sequencer.finalize_block(FinalizeBlockRequest {
            height,
            hash: block_hash(height, &txs),
            txs,
            proposer: self.proposer,
            misbehavior: Vec::new(),
        })?;
        self.sequencer.commit()?;
        self.height = height;
        tracing::info!(height, txs = count, "replayed block from entry log");
        Ok(())
    }

    /// Run CheckTx and queue the transaction if admitted and the mempool has room
    pub fn submit(&mut self, tx: Transaction) -> bool {
        if self.mempool_full() {
            tracing::warn!(capacity = self.mempool_size, "mempool full, dropping transaction");
            return false;
        }
        let resp = self.sequencer.check_tx(&CheckTxRequest {
            tx: tx.clone(),
            ..Default::default()
        });
        if resp.is_ok() {
            self.mempool.push_back(tx);
            true
        } else {
            tracing::debug!(code = resp.code, log = %resp.log, "transaction rejected");
            false
        }
    }

    /// Run one height over the queued transactions.
    ///
    /// Returns the committed height, or `None` when nothing was queued or the
    /// proposal was rejected.
    pub fn produce_block(&mut self) -> SequencerResult<Option<BlockHeight>> {
        let height = self.height + 1;
        if let Some(logged) = self.uncommitted_log_height() {
            return Err(SequencerError::LogDiverged { height, logged });
        }
        if self.mempool.is_empty() {
            return Ok(None);
        }
        let take = self.mempool.len().min(self.max_block_txs);
        let candidates: Vec<Transaction> = self.mempool.drain(..take).collect();

        let proposal = self.sequencer.prepare_proposal(PrepareProposalRequest {
            height,
            txs: candidates,
        });
        let verdict = self.sequencer.process_proposal(&ProcessProposalRequest {
            height,
            txs: proposal.txs.clone(),
            proposer: self.proposer,
        });
        if verdict.status == Verdict::Reject {
            tracing::warn!(height, txs = proposal.txs.len(), "proposal rejected, dropping batch");
            return Ok(None);
        }

        let hash = block_hash(height, &proposal.txs);
        let finalized = self.sequencer.finalize_block(FinalizeBlockRequest {
            height,
            hash,
            txs: proposal.txs.clone(),
            proposer: self.proposer,
            misbehavior: Vec::new(),
        });
        if let Err(e) = finalized {
            for tx in proposal.txs.into_iter().rev() {
                self.mempool.push_front(tx);
            }
            return Err(e);
        }

        self.sequencer.commit()?;
        self.height = height;
        Ok(Some(height))
    }

    /// Feed stdin lines and produce a block every `block_time` until Ctrl+C
    pub async fn run(mut self, block_time: Duration) -> Result<()> {
        let (tx_sender, mut tx_receiver) = mpsc::channel(self.mempool_size);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_tx(&line) {
                        Some(Ok(tx)) => {
                            if tx_sender.send(tx).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => tracing::warn!(error = %e, "skipping malformed hex line"),
                        None => {}
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            tracing::debug!("stdin closed");
        });

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut ticker = interval(block_time);
        let mut input_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                received = tx_receiver.recv(), if input_open && !self.mempool_full() => match received {
                    Some(tx) => {
                        self.submit(tx);
                    }
                    None => input_open = false,
                },
                _ = ticker.tick() => match self.produce_block() {
                    Ok(Some(height)) => tracing::debug!(height, "block produced"),
                    Ok(None) => {}
                    Err(e) if e.is_unrecoverable() => {
                        tracing::error!(error = %e, "stopping on unrecoverable error");
                        return Err(e.into());
                    }
                    Err(e) => tracing::warn!(error = %e, "block production failed, will retry"),
                },
            }
        }

        self.sequencer.close()?;
        tracing::info!(height = self.height(), queued = self.queued(), "driver stopped");
        Ok(())
    }

    /// Last committed height
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Transactions waiting for a block
    pub fn queued(&self) -> usize {
        self.mempool.len()
    }

    fn mempool_full(&self) -> bool {
        self.mempool.len() >= self.mempool_size
    }
}

/// Block hash the driver assigns in place of consensus
fn block_hash(height: BlockHeight, txs: &[Transaction]) -> dseq_primitives::H256 {
    let mut preimage = height.to_be_bytes().to_vec();
    for tx in txs {
        preimage.extend_from_slice(keccak256(tx).as_bytes());
    }
    keccak256(&preimage)
}

//! Sequencing and admission policies

use dseq_primitives::{Address, Transaction};
use rand::seq::SliceRandom;

/// Accept / reject outcome of an admission check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verdict {
    /// Admitted
    #[default]
    Accept,
    /// Refused; a normal outcome, not an error
    Reject,
}

impl Verdict {
    /// Whether this is [`Verdict::Accept`]
    pub fn is_accept(self) -> bool {
        self == Verdict::Accept
    }
}

/// Decides the order of transactions in a proposal.
///
/// Must return a permutation of its input. Replicas may disagree on the
/// order; consensus agrees on the proposed one.
pub trait OrderingPolicy {
    /// Reorder `txs`
    fn order(&self, txs: Vec<Transaction>) -> Vec<Transaction>;
}

/// Uniform random reorder (Fisher–Yates)
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrder;

impl OrderingPolicy for RandomOrder {
    fn order(&self, mut txs: Vec<Transaction>) -> Vec<Transaction> {
        txs.shuffle(&mut rand::thread_rng());
        txs
    }
}

/// Keep mempool order
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveOrder;

impl OrderingPolicy for PreserveOrder {
    fn order(&self, txs: Vec<Transaction>) -> Vec<Transaction> {
        txs
    }
}

/// Admission rules for single transactions and whole proposals
pub trait AdmissionPolicy {
    /// Mempool gate for one transaction
    fn check_tx(&self, tx: &Transaction) -> Verdict;

    /// Verdict on a proposed batch
    fn validate_batch(&self, txs: &[Transaction], proposer: &Address) -> Verdict;
}

/// Admit everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AdmissionPolicy for AcceptAll {
    fn check_tx(&self, _tx: &Transaction) -> Verdict {
        Verdict::Accept
    }

    fn validate_batch(&self, _txs: &[Transaction], _proposer: &Address) -> Verdict {
        Verdict::Accept
    }
}

/// Refuse transactions larger than a byte limit
#[derive(Debug, Clone, Copy)]
pub struct MaxTxBytes(pub usize);

impl AdmissionPolicy for MaxTxBytes {
    fn check_tx(&self, tx: &Transaction) -> Verdict {
        if tx.len() > self.0 {
            Verdict::Reject
        } else {
            Verdict::Accept
        }
    }

    fn validate_batch(&self, txs: &[Transaction], _proposer: &Address) -> Verdict {
        if txs.iter().all(|tx| self.check_tx(tx).is_accept()) {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

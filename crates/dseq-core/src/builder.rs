//! Application shell: assembles and validates a [`Sequencer`]
//!
//! A sequencer is only handed out once every required collaborator is present
//! and usable, so a half-initialized node never starts.

use crate::error::{SequencerError, SequencerResult};
use crate::ledger::SequenceLedger;
use crate::policy::{AcceptAll, AdmissionPolicy, OrderingPolicy, RandomOrder};
use crate::sequencer::Sequencer;
use dseq_primitives::Address;
use dseq_storage::StateStore;
use dseq_stream::AtomicStreamWriter;
use std::path::Path;

/// Fluent builder for [`Sequencer`]
pub struct SequencerBuilder<W> {
    identity: Option<String>,
    address: Option<Address>,
    store: Option<StateStore>,
    stream: Option<W>,
    ledger: Option<SequenceLedger>,
    ordering: Box<dyn OrderingPolicy + Send>,
    admission: Box<dyn AdmissionPolicy + Send>,
}

impl<W> Default for SequencerBuilder<W> {
    fn default() -> Self {
        Self {
            identity: None,
            address: None,
            store: None,
            stream: None,
            ledger: None,
            ordering: Box::new(RandomOrder),
            admission: Box::new(AcceptAll),
        }
    }
}

impl<W: AtomicStreamWriter> SequencerBuilder<W> {
    /// Create an empty builder with the default policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node moniker
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the sequencer address
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the state store
    pub fn state_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the entry log writer
    pub fn stream(mut self, stream: W) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set the sequence ledger. Optional.
    pub fn ledger(mut self, ledger: SequenceLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Replace the ordering policy
    pub fn ordering(mut self, policy: impl OrderingPolicy + Send + 'static) -> Self {
        self.ordering = Box::new(policy);
        self
    }

    /// Replace the admission policy
    pub fn admission(mut self, policy: impl AdmissionPolicy + Send + 'static) -> Self {
        self.admission = Box::new(policy);
        self
    }

    /// Validate the collaborators and build the sequencer
    pub fn build(self) -> SequencerResult<Sequencer<W>> {
        let identity = match self.identity {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(config_error("identity cannot be empty")),
        };
        let address = match self.address {
            Some(addr) if !addr.is_zero() => addr,
            Some(_) => return Err(config_error("address cannot be zero")),
            None => return Err(config_error("address is required")),
        };
        let store = match self.store {
            Some(store) if store.is_open() => store,
            Some(_) => return Err(config_error("state store is closed")),
            None => return Err(config_error("state store is required")),
        };
        let stream = self
            .stream
            .ok_or_else(|| config_error("entry log writer is required"))?;

        let state = store.state();
        tracing::info!(
            identity = %identity,
            address = %address,
            size = state.size,
            height = state.height,
            last_logged_block = ?stream.last_block_height(),
            "sequencer ready"
        );

        Ok(Sequencer::from_parts(
            identity,
            address,
            store,
            stream,
            self.ledger,
            self.ordering,
            self.admission,
        ))
    }
}

/// Open the state store under `path`, reporting failures as initialization errors
pub fn open_state_store(path: impl AsRef<Path>) -> SequencerResult<StateStore> {
    let path = path.as_ref();
    StateStore::open(path).map_err(|e| {
        SequencerError::Initialization(format!(
            "failed to open state store {}: {}",
            path.display(),
            e
        ))
    })
}

fn config_error(msg: &str) -> SequencerError {
    SequencerError::Configuration(msg.to_string())
}

//! Component assembly for the dseq node

use crate::config::NodeConfig;
use dseq_core::{
    open_state_store, SequenceLedger, Sequencer, SequencerBuilder, SequencerError,
    SequencerResult,
};
use dseq_primitives::{Address, BlockHeight, Transaction};
use dseq_stream::{FileStream, StreamReader, StreamType};

/// Open the state store, entry log and sequence ledger under the node home
/// and assemble a sequencer from them
pub fn open_sequencer(config: &NodeConfig, address: Address) -> SequencerResult<Sequencer<FileStream>> {
    std::fs::create_dir_all(&config.home).map_err(|e| {
        SequencerError::Initialization(format!(
            "failed to create home {}: {}",
            config.home.display(),
            e
        ))
    })?;

    let store = open_state_store(config.state_dir())?;
    let stream_path = config.stream_path();
    let stream = FileStream::open(&stream_path, StreamType::SEQUENCER).map_err(|e| {
        SequencerError::Initialization(format!(
            "failed to open entry log {}: {}",
            stream_path.display(),
            e
        ))
    })?;
    let ledger = SequenceLedger::open(&config.home)?;

    tracing::info!(
        home = %config.home.display(),
        moniker = %config.moniker,
        entries = stream.entry_count(),
        "node components opened"
    );

    SequencerBuilder::new()
        .identity(config.moniker.clone())
        .address(address)
        .state_store(store)
        .stream(stream)
        .ledger(ledger)
        .build()
}

/// Transactions of the committed entry-log block at `height`, in log order
pub fn logged_block_txs(
    config: &NodeConfig,
    height: BlockHeight,
) -> SequencerResult<Vec<Transaction>> {
    let path = config.stream_path();
    let txs = StreamReader::open(&path)
        .and_then(|reader| reader.block_txs(height))
        .map_err(|e| {
            SequencerError::Initialization(format!(
                "failed to read entry log {}: {}",
                path.display(),
                e
            ))
        })?;
    txs.ok_or_else(|| {
        SequencerError::Initialization(format!(
            "entry log {} has no complete block at height {}",
            path.display(),
            height
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dseq_core::{FinalizeBlockRequest, InfoRequest};
    use tempfile::TempDir;

    fn config(home: &std::path::Path) -> NodeConfig {
        NodeConfig {
            home: home.to_path_buf(),
            address: "0x00000000000000000000000000000000000000aa".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_creates_layout() {
        let home = TempDir::new().unwrap();
        let config = config(&home.path().join("node"));
        let address = config.validate().unwrap();

        let seq = open_sequencer(&config, address).unwrap();
        assert_eq!(seq.identity(), "dseq");
        assert!(config.state_dir().exists());
        assert!(config.stream_path().exists());
        assert!(config.home.join(dseq_core::SEQUENCE_FILE).exists());
    }

    #[test]
    fn test_reopen_keeps_height() {
        let home = TempDir::new().unwrap();
        let config = config(home.path());
        let address = config.validate().unwrap();
        {
            let mut seq = open_sequencer(&config, address).unwrap();
            seq.finalize_block(FinalizeBlockRequest {
                height: 1,
                txs: vec![Transaction::from_static(b"a")],
                ..Default::default()
            })
            .unwrap();
            seq.commit().unwrap();
            seq.close().unwrap();
        }

        let seq = open_sequencer(&config, address).unwrap();
        assert_eq!(seq.info(&InfoRequest::default()).last_block_height, 1);
        assert_eq!(seq.stream().entry_count(), 3);
    }

    #[test]
    fn test_logged_block_txs_after_crash() {
        let home = TempDir::new().unwrap();
        let config = config(home.path());
        let address = config.validate().unwrap();
        {
            let mut seq = open_sequencer(&config, address).unwrap();
            seq.finalize_block(FinalizeBlockRequest {
                height: 1,
                txs: vec![Transaction::from_static(b"a"), Transaction::from_static(b"b")],
                ..Default::default()
            })
            .unwrap();
        }

        let seq = open_sequencer(&config, address).unwrap();
        assert_eq!(seq.state().height, 0);
        let txs = logged_block_txs(&config, 1).unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs.contains(&Transaction::from_static(b"a")));
        assert!(matches!(
            logged_block_txs(&config, 2),
            Err(SequencerError::Initialization(_))
        ));
    }

    #[test]
    fn test_home_is_a_file() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let config = config(&file);
        let address = config.validate().unwrap();

        assert!(matches!(
            open_sequencer(&config, address),
            Err(SequencerError::Initialization(_))
        ));
    }
}

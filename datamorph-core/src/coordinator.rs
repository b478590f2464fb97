//! Owns the currently loaded file: its indexer, schema, cache/transformer,
//! and action stack. Routes file-open and action-stack-change events to the
//! rest of the engine, the way an external TUI collaborator would drive it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::actions::MorphAction;
use crate::config::EngineConfig;
use crate::error::DataMorphResult;
use crate::filter_index::FilterRowIndexer;
use crate::format::SourceFormat;
use crate::indexer::RowIndexer;
use crate::reader::RowReader;
use crate::schema::TableSchema;
use crate::schema_scanner;
use crate::table::CachedTableSource;
use crate::transformer::{LazyTransformer, RawRowSource, TableSource};

/// The currently active presented view: either the raw table, or a lazily
/// transformed projection once the action stack is non-empty.
enum View {
    Base(Arc<CachedTableSource>),
    Transformed(Arc<LazyTransformer<CachedTableSource>>),
}

impl View {
    fn as_table_source(&self) -> Arc<dyn TableSource> {
        match self {
            View::Base(b) => b.clone() as Arc<dyn TableSource>,
            View::Transformed(t) => t.clone() as Arc<dyn TableSource>,
        }
    }
}

/// Holds the lifecycle of one opened file. Dropping the coordinator cancels
/// background work and releases its readers.
pub struct Coordinator {
    config: EngineConfig,
    indexer: Arc<RowIndexer>,
    schema_rx: watch::Receiver<Arc<TableSchema>>,
    base: Arc<CachedTableSource>,
    view: View,
    actions: Vec<MorphAction>,
    cancel: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Opens `path`, building the index in the background, running the
    /// initial schema scan synchronously, and spawning background schema
    /// refinement.
    #[instrument(skip(config))]
    pub async fn open(path: impl Into<PathBuf>, format: SourceFormat, config: EngineConfig) -> DataMorphResult<Self> {
        let path = path.into();
        let indexer = Arc::new(RowIndexer::new(path.clone(), format, &config));
        let cancel = CancellationToken::new();
        let mut background = Vec::new();

        let build_indexer = indexer.clone();
        background.push(tokio::task::spawn_blocking(move || {
            if let Err(err) = build_indexer.build_index() {
                tracing::error!(%err, "build_index failed");
            }
        }));

        let scan_reader = RowReader::new(&path, format, &config)?;
        let scan_config = config.clone();
        let initial_schema = tokio::task::spawn_blocking(move || {
            schema_scanner::initial_scan(&scan_reader, format, &scan_config)
        })
        .await
        .expect("initial scan task panicked")?;

        let (schema_tx, schema_rx) = watch::channel(initial_schema.clone());

        let base = Arc::new(CachedTableSource::new(
            path.clone(),
            format,
            config.clone(),
            indexer.clone(),
            schema_tx.subscribe(),
        )?);

        let refine_reader = Arc::new(RowReader::new(&path, format, &config)?);
        let refine_indexer = indexer.clone();
        let refine_cancel = cancel.clone();
        let refine_batch = config.filter_batch_size;
        let refine_start_row = config.schema_sample_size;
        background.push(tokio::spawn(async move {
            let result = schema_scanner::run_background_scan(
                initial_schema,
                refine_indexer,
                refine_reader,
                refine_start_row,
                format,
                refine_batch,
                refine_cancel,
                schema_tx,
            )
            .await;
            if let Err(err) = result {
                tracing::debug!(%err, "background schema scan ended");
            }
        }));

        info!(path = %base.path().display(), "file opened");

        Ok(Self {
            config,
            indexer,
            schema_rx,
            view: View::Base(base.clone()),
            base,
            actions: Vec::new(),
            cancel,
            background,
        })
    }

    /// The most recently published schema snapshot.
    pub fn schema(&self) -> Arc<TableSchema> {
        self.schema_rx.borrow().clone()
    }

    /// The current presented table: the raw source, or a lazy transform of
    /// it if the action stack is non-empty.
    pub fn table(&self) -> Arc<dyn TableSource> {
        self.view.as_table_source()
    }

    pub fn total_rows(&self) -> usize {
        self.indexer.total_rows()
    }

    /// Replaces the action stack, rebuilding the transformer and, if any
    /// filter actions are present, spawning a fresh background filter row
    /// indexer. Semantically equivalent to rewinding and re-projecting.
    #[instrument(skip(self, actions))]
    pub fn apply_actions(&mut self, actions: Vec<MorphAction>) -> DataMorphResult<()> {
        self.actions = actions;
        if self.actions.is_empty() {
            self.view = View::Base(self.base.clone());
            return Ok(());
        }

        let transformer = Arc::new(LazyTransformer::new(self.base.clone(), &self.actions));
        if transformer.needs_filter_indexer() {
            let reader = self.base.open_reader()?;
            let filter_indexer = Arc::new(FilterRowIndexer::new(
                transformer.filter_specs().to_vec(),
                self.schema(),
                self.indexer.clone(),
                reader,
                self.base.format(),
                &self.config,
            ));
            transformer.attach_filter_indexer(filter_indexer.clone());

            let cancel = self.cancel.clone();
            self.background.push(tokio::spawn(async move {
                if let Err(err) = filter_indexer.build_index(cancel).await {
                    tracing::debug!(%err, "filter row indexer ended");
                }
            }));
        }

        self.view = View::Transformed(transformer);
        Ok(())
    }

    /// Cancels all background work and releases this file's readers.
    pub fn close(&mut self) {
        self.cancel.cancel();
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Operator;
    use datamorph_test_utils::csv_fixture;

    #[tokio::test]
    async fn open_builds_index_and_initial_schema() {
        let file = csv_fixture(50);
        let coordinator = Coordinator::open(file.path(), SourceFormat::Csv, EngineConfig::default())
            .await
            .unwrap();
        // allow the spawned build_index blocking task a moment to complete
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(coordinator.schema().len(), 3);
        assert!(coordinator.table().columns() == 3);
    }

    #[tokio::test]
    async fn apply_actions_rebuilds_transformed_view() {
        let file = csv_fixture(10);
        let mut coordinator = Coordinator::open(file.path(), SourceFormat::Csv, EngineConfig::default())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        coordinator
            .apply_actions(vec![MorphAction::Filter {
                name: "name".into(),
                op: Operator::Equals,
                value: "user3".into(),
            }])
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let table = coordinator.table();
        assert_eq!(table.rows(), 1);
        assert_eq!(table.cell(0, 0).unwrap(), "3");
    }
}

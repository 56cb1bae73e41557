//! Ingestion passes over framed XDR input.
//!
//! A [`Runner`] owns the database handle and drives one
//! [`AssetStatsProcessor`] per ledger:
//!
//! - [`Runner::ingest_snapshot`] builds a fresh index from every live entry
//!   of a ledger in bulk mode.
//! - [`Runner::ingest_ledger`] applies one ledger's entry changes in
//!   incremental mode. Whenever the classic working set grows past
//!   `ingest.batch_size` assets it is reconciled early, inside the same
//!   transaction as the final commit.
//!
//! A ledger's raw entry changes are compacted to one net change per entry
//! before processing.
//!
//! Ledgers must arrive in order: an incremental pass is only accepted for
//! the ledger right after the last ingested one, since the expiration
//! sweep only looks one ledger back.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use asset_stats_common::xdr_stream::XdrInputStream;
use asset_stats_common::{AssetIdentity, Hash256};
use asset_stats_db::{AssetStatQueries, ContractQueries, Database, SqlStore, StateQueries};
use asset_stats_ingest::{
    changes_from_ledger_entry_changes, compact_changes, AssetBuckets, AssetContract,
    AssetStatsProcessor, Change, CommitSummary, ContractStatRow, ReconcileMode,
};
use stellar_xdr::curr::{LedgerEntry, LedgerEntryChange};
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub ledger: u32,
    pub mode: ReconcileMode,
    /// Changes fed to the processor.
    pub changes: usize,
    /// Mid-ledger classic flushes forced by the batch size.
    pub intermediate_flushes: usize,
    pub summary: CommitSummary,
}

/// Everything persisted about one asset.
#[derive(Debug, Clone)]
pub struct AssetReport {
    pub asset: AssetIdentity,
    /// ID of the asset's Stellar Asset Contract on the configured network.
    pub contract_id: Hash256,
    pub classic: Option<AssetBuckets>,
    pub contract: Option<ContractStatRow>,
    /// Set once the asset contract's metadata entry has been seen.
    pub asset_contract: Option<AssetContract>,
    /// Balance rows held in the asset contract, active or archived.
    pub contract_balance_rows: u64,
}

impl fmt::Display for AssetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "asset:        {}", self.asset)?;
        writeln!(
            f,
            "contract:     {}",
            stellar_strkey::Contract(*self.contract_id.as_bytes())
        )?;
        match &self.classic {
            Some(buckets) => {
                for (bucket, totals) in buckets.iter() {
                    writeln!(
                        f,
                        "  {:<36} balance={} holders={}",
                        bucket.as_str(),
                        totals.balance,
                        totals.holders
                    )?;
                }
                writeln!(f, "  liquidity pools: {}", buckets.liquidity_pools())?;
            }
            None => writeln!(f, "  no classic holders")?,
        }
        match &self.asset_contract {
            Some(AssetContract {
                expiration_ledger: Some(ledger),
                ..
            }) => writeln!(f, "asset contract deployed, live until ledger {ledger}")?,
            Some(_) => writeln!(f, "asset contract deployed")?,
            None => writeln!(f, "asset contract not deployed")?,
        }
        if let Some(stat) = &self.contract {
            writeln!(
                f,
                "  contract balances: active_balance={} active_holders={} \
                 archived_balance={} archived_holders={}",
                stat.active_balance, stat.active_holders, stat.archived_balance, stat.archived_holders
            )?;
        }
        write!(f, "  contract balance rows: {}", self.contract_balance_rows)
    }
}

pub struct Runner {
    config: AppConfig,
    db: Database,
}

impl Runner {
    /// Opens (or creates) the configured database.
    pub fn open(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let db = Database::open_with_pool_size(&config.database.path, config.database.pool_size)
            .with_context(|| format!("opening database {}", config.database.path.display()))?;
        Self::with_database(config, db)
    }

    /// Wraps an already opened database.
    ///
    /// Fails if the database was populated under a different network
    /// passphrase.
    pub fn with_database(config: AppConfig, db: Database) -> anyhow::Result<Self> {
        if let Some(stored) = db.network_passphrase()? {
            if stored != config.network.passphrase {
                anyhow::bail!(
                    "database was ingested with network passphrase {stored:?}, configured {:?}",
                    config.network.passphrase
                );
            }
        }
        Ok(Self { config, db })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Records the network passphrase on an empty database.
    pub fn init_database(&self) -> anyhow::Result<()> {
        let passphrase = &self.config.network.passphrase;
        self.db.transaction(|tx| {
            if tx.get_network_passphrase()?.is_none() {
                tx.set_network_passphrase(passphrase)?;
            }
            Ok::<_, asset_stats_db::DbError>(())
        })?;
        info!(
            path = %self.config.database.path.display(),
            passphrase = %passphrase,
            "Initialized asset stats database"
        );
        Ok(())
    }

    /// Builds the index from a full snapshot of `ledger`'s live entries.
    ///
    /// The database must not have ingested any ledger yet.
    pub fn ingest_snapshot<I>(&self, ledger: u32, entries: I) -> anyhow::Result<IngestReport>
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        if let Some(last) = self.db.last_ingested_ledger()? {
            anyhow::bail!(
                "database already holds ledger {last}; a snapshot needs an empty database"
            );
        }

        let mut processor =
            AssetStatsProcessor::new(self.config.network_id(), ledger, ReconcileMode::Bulk)?;
        let mut changes = 0;
        for entry in entries {
            processor.process_change(Change::created(entry))?;
            changes += 1;
        }
        debug!(
            ledger,
            changes,
            assets = processor.working_set_len(),
            "Snapshot accumulated"
        );

        let summary = self.commit(ledger, processor)?;
        Ok(IngestReport {
            ledger,
            mode: ReconcileMode::Bulk,
            changes,
            intermediate_flushes: 0,
            summary,
        })
    }

    /// Reads a framed `LedgerEntry` stream and ingests it as a snapshot.
    pub fn ingest_snapshot_file(
        &self,
        ledger: u32,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<IngestReport> {
        let entries: Vec<LedgerEntry> = read_frames(path.as_ref())?;
        self.ingest_snapshot(ledger, entries)
    }

    /// Applies one ledger's entry changes on top of the persisted index.
    pub fn ingest_ledger<I>(&self, ledger: u32, changes: I) -> anyhow::Result<IngestReport>
    where
        I: IntoIterator<Item = LedgerEntryChange>,
    {
        match self.db.last_ingested_ledger()? {
            Some(last) if ledger <= last => {
                anyhow::bail!("ledger {ledger} is not after last ingested ledger {last}")
            }
            Some(last) if ledger != last + 1 => {
                anyhow::bail!("ledger {ledger} skips ahead of last ingested ledger {last}")
            }
            Some(_) => {}
            None => warn!(ledger, "No prior ledger ingested, starting from empty aggregates"),
        }

        let changes = compact_changes(changes_from_ledger_entry_changes(changes)?)?;
        let change_count = changes.len();
        let batch_size = self.config.ingest.batch_size;
        let mut processor =
            AssetStatsProcessor::new(self.config.network_id(), ledger, ReconcileMode::Incremental)?;
        let passphrase = &self.config.network.passphrase;

        let (summary, intermediate_flushes) = self.db.transaction(|tx| {
            let mut store = SqlStore::new(tx);
            let mut flushes = 0;
            for change in changes {
                processor.process_change(change)?;
                if processor.working_set_len() > batch_size {
                    processor.flush_classic(&mut store)?;
                    flushes += 1;
                }
            }
            let summary = processor.commit(&mut store)?;
            tx.set_last_ingested_ledger(ledger)?;
            tx.set_network_passphrase(passphrase)?;
            Ok::<_, anyhow::Error>((summary, flushes))
        })?;

        log_summary(ledger, ReconcileMode::Incremental, &summary);
        Ok(IngestReport {
            ledger,
            mode: ReconcileMode::Incremental,
            changes: change_count,
            intermediate_flushes,
            summary,
        })
    }

    /// Reads a framed `LedgerEntryChange` stream and ingests it.
    pub fn ingest_ledger_file(
        &self,
        ledger: u32,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<IngestReport> {
        let changes: Vec<LedgerEntryChange> = read_frames(path.as_ref())?;
        self.ingest_ledger(ledger, changes)
    }

    /// Loads everything persisted about `asset`.
    pub fn asset_report(&self, asset: &AssetIdentity) -> anyhow::Result<AssetReport> {
        let contract_id = asset.contract_id(&self.config.network_id())?;
        let report = self.db.with_connection(|conn| {
            Ok(AssetReport {
                asset: asset.clone(),
                contract_id,
                classic: conn.load_asset_stat(asset)?.map(|row| row.buckets),
                contract: conn.load_contract_stat(&contract_id)?,
                asset_contract: conn.load_asset_contract(&contract_id)?,
                contract_balance_rows: conn.count_contract_balances(&contract_id)?,
            })
        })?;
        Ok(report)
    }

    /// Number of classic asset rows.
    pub fn asset_count(&self) -> anyhow::Result<u64> {
        Ok(self.db.with_connection(|conn| conn.count_asset_stats())?)
    }

    fn commit(&self, ledger: u32, processor: AssetStatsProcessor) -> anyhow::Result<CommitSummary> {
        let mode = processor.mode();
        let passphrase = &self.config.network.passphrase;
        let summary = self.db.transaction(|tx| {
            let summary = processor.commit(&mut SqlStore::new(tx))?;
            tx.set_last_ingested_ledger(ledger)?;
            tx.set_network_passphrase(passphrase)?;
            Ok::<_, anyhow::Error>(summary)
        })?;
        log_summary(ledger, mode, &summary);
        Ok(summary)
    }
}

fn read_frames<T: stellar_xdr::curr::ReadXdr>(path: &Path) -> anyhow::Result<Vec<T>> {
    let mut stream = XdrInputStream::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let values = stream
        .read_all()
        .with_context(|| format!("reading XDR frames from {}", path.display()))?;
    debug!(path = %path.display(), frames = values.len(), "Read input frames");
    Ok(values)
}

fn log_summary(ledger: u32, mode: ReconcileMode, summary: &CommitSummary) {
    info!(
        ledger,
        %mode,
        classic_rows = summary.classic.total(),
        contract_rows = summary.contracts.total(),
        asset_contracts = summary.asset_contracts,
        restored_balances = summary.restored_balances,
        expired_balances = summary.expired_balances,
        "Ledger ingested"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_stats_common::xdr_stream::XdrOutputStream;
    use asset_stats_ingest::test_utils::*;
    use asset_stats_common::{ledger_entry_key, ledger_key_hash};

    fn runner() -> Runner {
        Runner::with_database(AppConfig::default(), Database::open_in_memory().unwrap()).unwrap()
    }

    fn runner_with_batch(batch_size: usize) -> Runner {
        let mut config = AppConfig::default();
        config.ingest.batch_size = batch_size;
        Runner::with_database(config, Database::open_in_memory().unwrap()).unwrap()
    }

    fn trustline_removed(n: u8, balance: i64) -> Vec<LedgerEntryChange> {
        let entry = trustline_entry(n, &usd(), balance, AUTHORIZED);
        let key = ledger_entry_key(&entry);
        vec![
            LedgerEntryChange::State(entry),
            LedgerEntryChange::Removed(key),
        ]
    }

    #[test]
    fn test_snapshot_then_ledger() {
        let runner = runner();
        let report = runner
            .ingest_snapshot(
                100,
                vec![
                    trustline_entry(1, &usd(), 10, AUTHORIZED),
                    trustline_entry(2, &usd(), 5, AUTHORIZED),
                ],
            )
            .unwrap();
        assert_eq!(report.mode, ReconcileMode::Bulk);
        assert_eq!(report.changes, 2);
        assert_eq!(runner.database().last_ingested_ledger().unwrap(), Some(100));

        runner.ingest_ledger(101, trustline_removed(1, 10)).unwrap();
        let asset = runner.asset_report(&usd_identity()).unwrap();
        let buckets = asset.classic.unwrap();
        assert_eq!(buckets.total_authorized_holders(), 1);
        assert_eq!(buckets.total_authorized_amount().to_string(), "5");
    }

    #[test]
    fn test_snapshot_requires_empty_database() {
        let runner = runner();
        runner.ingest_snapshot(100, Vec::new()).unwrap();
        let err = runner.ingest_snapshot(100, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("empty database"));
    }

    #[test]
    fn test_ledgers_must_be_sequential() {
        let runner = runner();
        runner.ingest_snapshot(100, Vec::new()).unwrap();
        assert!(runner.ingest_ledger(100, Vec::new()).is_err());
        assert!(runner.ingest_ledger(102, Vec::new()).is_err());
        runner.ingest_ledger(101, Vec::new()).unwrap();
        assert_eq!(runner.database().last_ingested_ledger().unwrap(), Some(101));
    }

    #[test]
    fn test_batch_size_forces_intermediate_flush() {
        let runner = runner_with_batch(1);
        let changes = vec![
            LedgerEntryChange::Created(trustline_entry(1, &usd(), 3, AUTHORIZED)),
            LedgerEntryChange::Created(trustline_entry(2, &eurodollar(), 4, AUTHORIZED)),
        ];
        let report = runner.ingest_ledger(10, changes).unwrap();
        assert_eq!(report.intermediate_flushes, 1);
        assert_eq!(report.summary.classic.inserted, 2);
        assert_eq!(runner.asset_count().unwrap(), 2);
    }

    #[test]
    fn test_failed_ledger_is_not_recorded() {
        let runner = runner_with_batch(1);
        runner.ingest_snapshot(100, Vec::new()).unwrap();
        let changes = vec![
            LedgerEntryChange::Created(trustline_entry(1, &usd(), 3, AUTHORIZED)),
            LedgerEntryChange::Created(trustline_entry(2, &eurodollar(), 4, AUTHORIZED)),
        ]
        .into_iter()
        .chain(trustline_removed(9, 1));

        assert!(runner.ingest_ledger(101, changes).is_err());
        assert_eq!(runner.database().last_ingested_ledger().unwrap(), Some(100));
        assert_eq!(runner.asset_count().unwrap(), 0);
    }

    #[test]
    fn test_balance_created_and_extended_in_one_ledger() {
        let runner = runner();
        runner.ingest_snapshot(99, Vec::new()).unwrap();

        let balance = make_balance_entry(sac_id(&usd()), make_hash(1), 300, 0);
        let changes = vec![
            LedgerEntryChange::Created(balance.clone()),
            LedgerEntryChange::Created(make_ttl_for(&balance, 110)),
            LedgerEntryChange::State(make_ttl_for(&balance, 110)),
            LedgerEntryChange::Updated(make_ttl_for(&balance, 200)),
        ];
        let report = runner.ingest_ledger(100, changes).unwrap();
        assert_eq!(report.changes, 2);

        let key_hash = ledger_key_hash(&balance).unwrap();
        let row = runner
            .database()
            .with_connection(|conn| conn.load_contract_balance(&key_hash))
            .unwrap()
            .unwrap();
        assert_eq!(row.expiration_ledger, 200);

        for ledger in 101..=112 {
            runner.ingest_ledger(ledger, Vec::new()).unwrap();
        }
        let stat = runner.asset_report(&usd_identity()).unwrap().contract.unwrap();
        assert_eq!(stat.active_holders, 1);
        assert_eq!(stat.active_balance.to_string(), "300");
    }

    #[test]
    fn test_passphrase_mismatch_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let runner = Runner::with_database(AppConfig::default(), db.clone()).unwrap();
        runner.init_database().unwrap();

        let err = Runner::with_database(AppConfig::mainnet(), db).err().unwrap();
        assert!(err.to_string().contains("network passphrase"));
    }

    #[test]
    fn test_ingest_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.xdr");
        let mut out = XdrOutputStream::create(&snapshot).unwrap();
        out.write_one(&trustline_entry(1, &usd(), 10, AUTHORIZED))
            .unwrap();
        out.finish().unwrap();

        let ledger = dir.path().join("ledger.xdr");
        let mut out = XdrOutputStream::create(&ledger).unwrap();
        for change in trustline_removed(1, 10) {
            out.write_one(&change).unwrap();
        }
        out.finish().unwrap();

        let runner = runner();
        runner.ingest_snapshot_file(7, &snapshot).unwrap();
        assert!(runner.asset_report(&usd_identity()).unwrap().classic.is_some());
        runner.ingest_ledger_file(8, &ledger).unwrap();
        assert!(runner.asset_report(&usd_identity()).unwrap().classic.is_none());
    }

    #[test]
    fn test_asset_report_display() {
        let runner = runner();
        runner
            .ingest_snapshot(5, vec![trustline_entry(1, &usd(), 10, AUTHORIZED)])
            .unwrap();
        let text = runner.asset_report(&usd_identity()).unwrap().to_string();
        assert!(text.contains("authorized"));
        assert!(text.contains("balance=10 holders=1"));
        assert!(text.contains("liquidity pools: 0"));
        assert!(text.contains("asset contract not deployed"));
    }
}

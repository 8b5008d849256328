use chrono::{DateTime, SubsecRound, Utc};

use vishwam_core::{
    Aggregate, AggregateRoot, Amount, Currency, DomainError, ExpectedVersion, TransactionId,
};
use vishwam_ledger::{Account, LedgerEvent, RecordDraft, TransactionRecord};

/// Staged view of one account inside an atomic unit of work.
///
/// Reads see the snapshot plus whatever this unit of work has staged so far.
/// Nothing is visible outside until the store commits.
#[derive(Debug, Clone)]
pub struct AccountTx {
    account: Account,
    base_version: u64,
    staged: Vec<RecordDraft>,
}

/// What a store writes on commit.
#[derive(Debug, Clone)]
pub(crate) struct PendingCommit {
    pub account: Account,
    pub records: Vec<TransactionRecord>,
}

impl AccountTx {
    pub(crate) fn begin(snapshot: Account) -> Self {
        Self {
            base_version: snapshot.version(),
            account: snapshot,
            staged: Vec::new(),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn balance(&self, currency: Currency) -> Amount {
        self.account.balance(currency)
    }

    pub fn set_balance(&mut self, currency: Currency, amount: Amount) {
        self.account.set_balance(currency, amount);
    }

    /// Stage a record. Id and timestamp are assigned at commit.
    pub fn append_record(&mut self, draft: RecordDraft) -> Result<(), DomainError> {
        if draft.user_id != *self.account.id() {
            return Err(DomainError::invariant(
                "record belongs to a different account",
            ));
        }
        self.staged.push(draft);
        Ok(())
    }

    /// Stage a decided event: its record plus the balance it leaves behind.
    pub fn post(&mut self, event: &LedgerEvent) -> Result<(), DomainError> {
        match event {
            LedgerEvent::EntryPosted(posted) => self.append_record(posted.record.clone())?,
        }
        self.account.apply(event);
        Ok(())
    }

    /// Version of the snapshot this unit of work started from.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Commit precondition: the document must still be at the snapshot version.
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::new(self.base_version)
    }

    pub fn staged(&self) -> &[RecordDraft] {
        &self.staged
    }

    /// Stamp staged records and bump the version.
    ///
    /// The commit time is truncated to microseconds, the precision Postgres
    /// keeps, so committed records compare equal to what a later read returns.
    pub(crate) fn finish(self, committed_at: DateTime<Utc>) -> PendingCommit {
        let committed_at = committed_at.trunc_subsecs(6);
        let records = self
            .staged
            .into_iter()
            .map(|draft| draft.into_record(TransactionId::new(), committed_at))
            .collect();
        PendingCommit {
            account: self.account.with_version(self.base_version + 1),
            records,
        }
    }
}

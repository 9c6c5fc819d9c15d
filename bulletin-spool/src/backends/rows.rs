use std::{
    collections::{BTreeMap, HashSet},
    time::{Duration, SystemTime},
};

use bulletin_common::{IssueId, NewsletterId, Recipient};

use crate::{RowResult, RowStatus, SpoolError, SpoolFilter, SpoolRow, SpoolRowId};

/// Row table shared by the backends
///
/// Every mutation reports which rows it touched so a persistent backend can
/// write exactly those rows before releasing its lock.
pub(crate) struct Rows {
    pub(crate) rows: BTreeMap<SpoolRowId, SpoolRow>,
    /// Monotonic so ids issued within one millisecond still sort in insertion order
    ids: ulid::Generator,
    /// Highest id held when the table was loaded. New ids sort after it
    floor: Option<ulid::Ulid>,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows").field("len", &self.rows.len()).finish()
    }
}

impl Default for Rows {
    fn default() -> Self {
        Self::from_rows(Vec::new())
    }
}

impl Rows {
    pub(crate) fn from_rows(rows: impl IntoIterator<Item = SpoolRow>) -> Self {
        let rows: BTreeMap<SpoolRowId, SpoolRow> =
            rows.into_iter().map(|row| (row.id, row)).collect();
        let floor = rows.keys().next_back().map(SpoolRowId::ulid);

        Self {
            rows,
            ids: ulid::Generator::new(),
            floor,
        }
    }

    fn next_id(&mut self) -> crate::Result<SpoolRowId> {
        let mut id = self.ids.generate()?;
        if let Some(floor) = self.floor
            && id <= floor
        {
            id = floor
                .increment()
                .ok_or_else(|| SpoolError::Internal("Row id space exhausted".to_string()))?;
            self.floor = Some(id);
        }

        Ok(SpoolRowId::new(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Insert pending rows, skipping recipients the issue already has in
    /// progress; all or nothing with respect to `capacity`
    pub(crate) fn enqueue(
        &mut self,
        issue_id: IssueId,
        newsletter_id: NewsletterId,
        recipients: &[Recipient],
        capacity: Option<usize>,
    ) -> crate::Result<Vec<SpoolRowId>> {
        let mut seen: HashSet<String> = self
            .rows
            .values()
            .filter(|row| row.issue_id == issue_id && !row.status.is_terminal())
            .map(|row| row.recipient.to_ascii_lowercase())
            .collect();

        let fresh: Vec<&Recipient> = recipients
            .iter()
            .filter(|recipient| seen.insert(recipient.mail.to_ascii_lowercase()))
            .collect();

        if let Some(capacity) = capacity
            && self.rows.len() + fresh.len() > capacity
        {
            return Err(SpoolError::CapacityExceeded {
                held: self.rows.len(),
                requested: fresh.len(),
                capacity,
            });
        }

        let mut created = Vec::with_capacity(fresh.len());
        for recipient in fresh {
            let id = self.next_id()?;
            self.rows.insert(
                id,
                SpoolRow::pending(id, issue_id, newsletter_id, recipient.clone()),
            );
            created.push(id);
        }

        Ok(created)
    }

    pub(crate) fn claim(
        &mut self,
        limit: Option<usize>,
        filter: &SpoolFilter,
        now: SystemTime,
        expiration: Duration,
    ) -> Vec<SpoolRow> {
        self.rows
            .values_mut()
            .filter(|row| filter.matches_target(row) && row.is_claimable(now, expiration))
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| {
                if row.status == RowStatus::InFlight {
                    tracing::warn!(row_id = %row.id, "Reclaiming expired in-flight row");
                }
                row.status = RowStatus::InFlight;
                row.claimed_at = Some(now);
                row.clone()
            })
            .collect()
    }

    /// Put rows back as they were before a change that could not be recorded
    pub(crate) fn restore(&mut self, previous: Vec<SpoolRow>) {
        for row in previous {
            self.rows.insert(row.id, row);
        }
    }

    pub(crate) fn complete(
        &mut self,
        id: &SpoolRowId,
        status: RowStatus,
        result: RowResult,
    ) -> crate::Result<&SpoolRow> {
        let row = self.rows.get_mut(id).ok_or(SpoolError::NotFound(*id))?;

        if row.status != RowStatus::InFlight || !status.is_terminal() {
            return Err(SpoolError::InvalidTransition {
                id: *id,
                from: row.status,
                to: status,
            });
        }

        row.status = status;
        row.completed_at = Some(SystemTime::now());
        row.result = Some(result);
        Ok(row)
    }

    pub(crate) fn release(&mut self, ids: &[SpoolRowId]) -> Vec<SpoolRowId> {
        let mut released = Vec::new();

        for id in ids {
            if let Some(row) = self.rows.get_mut(id)
                && row.status == RowStatus::InFlight
            {
                row.status = RowStatus::Pending;
                row.claimed_at = None;
                released.push(*id);
            }
        }

        released
    }

    /// Remove terminal rows completed at least `retention` before `now`
    pub(crate) fn purge(&mut self, retention: Duration, now: SystemTime) -> Vec<SpoolRowId> {
        let expired: Vec<SpoolRowId> = self
            .rows
            .values()
            .filter(|row| {
                row.status.is_terminal()
                    && row.completed_at.is_some_and(|completed| {
                        now.duration_since(completed).unwrap_or_default() >= retention
                    })
            })
            .map(|row| row.id)
            .collect();

        for id in &expired {
            self.rows.remove(id);
        }

        expired
    }

    pub(crate) fn get(&self, id: &SpoolRowId) -> crate::Result<SpoolRow> {
        self.rows.get(id).cloned().ok_or(SpoolError::NotFound(*id))
    }

    pub(crate) fn select(&self, filter: &SpoolFilter) -> Vec<SpoolRow> {
        self.rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, filter: &SpoolFilter) -> usize {
        self.rows.values().filter(|row| filter.matches(row)).count()
    }
}

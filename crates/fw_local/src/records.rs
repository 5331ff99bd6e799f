//! In-memory record store refreshed page by page from the remote service.
//!
//! Records are kept newest first, in service order. The persisted blob holds
//! one JSON object per line.

use std::collections::HashMap;

use fwl_client::{
    ApiHandle, ProgressCallback, Record, RecordStore, RecordStoreError, StoreKind,
};
use tracing::{debug, info};

use crate::progress::HIDDEN;

pub struct MemoryRecordStore {
    kind: StoreKind,
    api: ApiHandle,
    progress: ProgressCallback,
    records: Vec<Record>,
    index: HashMap<u64, usize>,
}

impl MemoryRecordStore {
    pub fn new(kind: StoreKind, api: ApiHandle, progress: ProgressCallback) -> Self {
        Self {
            kind,
            api,
            progress,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuilds a store from a blob produced by [`RecordStore::store_to_string`].
    ///
    /// Blank lines are ignored; an empty blob yields an empty store.
    pub fn restore_from_string(
        kind: StoreKind,
        blob: &str,
        api: ApiHandle,
        progress: ProgressCallback,
    ) -> Result<Self, RecordStoreError> {
        let mut store = Self::new(kind, api, progress);
        let mut records = Vec::new();
        for (line_index, line) in blob.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|source| RecordStoreError::Restore {
                kind,
                line: line_index + 1,
                source,
            })?;
            records.push(record);
        }
        store.replace_all(records);
        debug!(kind = %kind, records = store.records.len(), "record store restored");
        Ok(store)
    }

    fn replace_all(&mut self, records: Vec<Record>) {
        self.records = records;
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id, position))
            .collect();
    }

    fn report(&self, page: usize, total_pages: usize) {
        let percent = ((page + 1) * 100 / total_pages.max(1)).min(100);
        (self.progress)(percent as i32);
    }

    fn updated<T>(&self, result: Result<T, RecordStoreError>) -> Result<T, RecordStoreError> {
        (self.progress)(HIDDEN);
        result
    }

    fn fetch_all(&self) -> Result<Vec<Record>, RecordStoreError> {
        (self.progress)(0);
        let first = self.api.fetch_page(self.kind, 0)?;
        let total_pages = first.total_pages;
        self.report(0, total_pages);

        let mut records = first.records;
        for page in 1..total_pages {
            records.extend(self.api.fetch_page(self.kind, page)?.records);
            self.report(page, total_pages);
        }
        Ok(records)
    }

    /// Merges pages newest first until a page brings nothing new or changed.
    fn merge_recent(&mut self) -> Result<(usize, usize), RecordStoreError> {
        (self.progress)(0);
        let mut fresh = Vec::new();
        let mut changed = 0;
        let mut page = 0;
        loop {
            let batch = self.api.fetch_page(self.kind, page)?;
            self.report(page, batch.total_pages);

            let mut page_had_news = false;
            for record in batch.records {
                match self.index.get(&record.id) {
                    Some(&position) if self.records[position] == record => {}
                    Some(&position) => {
                        self.records[position] = record;
                        changed += 1;
                        page_had_news = true;
                    }
                    None if fresh.iter().any(|known: &Record| known.id == record.id) => {}
                    None => {
                        fresh.push(record);
                        page_had_news = true;
                    }
                }
            }

            page += 1;
            if !page_had_news || page >= batch.total_pages {
                break;
            }
        }

        let added = fresh.len();
        if added > 0 {
            fresh.append(&mut self.records);
            self.records = fresh;
            self.rebuild_index();
        }
        Ok((added, changed))
    }
}

impl RecordStore for MemoryRecordStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn soft_update(&mut self) -> Result<(), RecordStoreError> {
        let result = self.merge_recent();
        let (added, changed) = self.updated(result)?;
        info!(kind = %self.kind, added, changed, "soft update finished");
        Ok(())
    }

    fn hard_update(&mut self) -> Result<(), RecordStoreError> {
        let result = self.fetch_all();
        let records = self.updated(result)?;
        self.replace_all(records);
        info!(kind = %self.kind, records = self.records.len(), "hard update finished");
        Ok(())
    }

    fn get_by_id(&self, id: u64) -> Option<&Record> {
        self.index.get(&id).map(|&position| &self.records[position])
    }

    fn records(&self) -> &[Record] {
        &self.records
    }

    fn store_to_string(&self) -> String {
        self.records
            .iter()
            .filter_map(|record| serde_json::to_string(record).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwl_client::{AuthClient, Session, SessionSource};
    use fwl_client_mock::{record, MockHistoryService};
    use std::sync::{Arc, Mutex};

    struct StaticSession(Session);

    impl SessionSource for StaticSession {
        fn session(&self) -> Option<Session> {
            Some(self.0.clone())
        }
    }

    fn catalog(count: u64) -> Vec<Record> {
        (1..=count)
            .rev()
            .map(|id| record(id, &format!("Movie {id}"), 2000 + id as u16, (id % 10) as u8))
            .collect()
    }

    fn store_with(
        service: Arc<MockHistoryService>,
    ) -> (MemoryRecordStore, Arc<Mutex<Vec<i32>>>) {
        let session = service
            .login("demo", "pw")
            .expect("test account should sign in");
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);
        let callback: ProgressCallback = Arc::new(move |value| {
            sink.lock().expect("progress lock").push(value);
        });
        let api = ApiHandle::new(service, Arc::new(StaticSession(session)));
        (MemoryRecordStore::new(StoreKind::Movie, api, callback), progress)
    }

    fn signed_in_service(records: Vec<Record>) -> Arc<MockHistoryService> {
        Arc::new(
            MockHistoryService::new(4)
                .with_account("demo", "pw")
                .with_records(records),
        )
    }

    #[test]
    fn hard_update_fetches_every_page_and_reports_progress() {
        let service = signed_in_service(catalog(10));
        let (mut store, progress) = store_with(Arc::clone(&service));

        store.hard_update().expect("hard update");

        assert_eq!(store.records().len(), 10);
        assert_eq!(store.records()[0].id, 10);
        assert_eq!(service.pages_served(), 3);
        assert_eq!(*progress.lock().expect("progress lock"), vec![0, 33, 66, 100, -1]);
    }

    #[test]
    fn soft_update_stops_at_first_page_without_news() {
        let service = signed_in_service(catalog(12));
        let (mut store, _progress) = store_with(Arc::clone(&service));
        store.hard_update().expect("hard update");
        let served = service.pages_served();

        service.push_newest(record(99, "Fresh", 2024, 8));
        store.soft_update().expect("soft update");

        assert_eq!(store.records()[0].id, 99);
        assert_eq!(store.records().len(), 13);
        // Page 0 had news, page 1 did not.
        assert_eq!(service.pages_served() - served, 2);
    }

    #[test]
    fn soft_update_replaces_changed_records_in_place() {
        let service = signed_in_service(catalog(3));
        let (mut store, _progress) = store_with(Arc::clone(&service));
        store.hard_update().expect("hard update");

        let mut rerated = record(2, "Movie 2", 2002, 10);
        rerated.favourite = true;
        assert!(service.replace_record(rerated.clone()));
        store.soft_update().expect("soft update");

        assert_eq!(store.get_by_id(2), Some(&rerated));
        assert_eq!(store.records().len(), 3);
    }

    #[test]
    fn failed_update_hides_progress_and_keeps_records() {
        let service = signed_in_service(catalog(8));
        let (mut store, progress) = store_with(Arc::clone(&service));
        store.hard_update().expect("hard update");
        progress.lock().expect("progress lock").clear();

        service.fail_page(Some(1));
        store.hard_update().expect_err("page 1 fails");

        assert_eq!(store.records().len(), 8);
        assert_eq!(progress.lock().expect("progress lock").last(), Some(&-1));
    }

    #[test]
    fn blob_restores_the_same_records() {
        let service = signed_in_service(catalog(5));
        let (mut store, _progress) = store_with(Arc::clone(&service));
        store.hard_update().expect("hard update");
        let blob = store.store_to_string();

        let (empty, _) = store_with(service);
        let restored = MemoryRecordStore::restore_from_string(
            StoreKind::Movie,
            &blob,
            empty.api.clone(),
            Arc::new(|_| {}),
        )
        .expect("blob restores");

        assert_eq!(restored.records(), store.records());
        assert_eq!(restored.get_by_id(3).map(|r| r.title.as_str()), Some("Movie 3"));
    }

    #[test]
    fn corrupt_blob_line_is_reported() {
        let service = signed_in_service(Vec::new());
        let (store, _) = store_with(service);
        let error = match MemoryRecordStore::restore_from_string(
            StoreKind::Movie,
            "{\"id\":1,\"title\":\"ok\"}\nnot json",
            store.api.clone(),
            Arc::new(|_| {}),
        ) {
            Ok(_) => panic!("corrupt blob should fail"),
            Err(error) => error,
        };

        assert!(matches!(error, RecordStoreError::Restore { line: 2, .. }));
    }
}

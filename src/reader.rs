use std::collections::HashSet;

use log::{debug, warn, Level};
use logging_timer::timer;

use crate::error::RosterSyncError;
use crate::model::StoredRecord;
use crate::store::RemoteStore;

/// Records read from one collection. `interrupted` holds the failure that
/// cut the read short when the reader is told not to abort.
#[derive(Debug, Default)]
pub struct CollectionRead {
    pub collection: String,
    pub records: Vec<StoredRecord>,
    pub interrupted: Option<String>,
}

pub struct EntityReader<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    page_size: usize,
    abort_on_error: bool,
    sort_key: Option<String>,
}

impl<'a, S: RemoteStore + ?Sized> EntityReader<'a, S> {
    pub fn new(store: &'a S, page_size: usize, abort_on_error: bool) -> Self {
        EntityReader {
            store,
            page_size: page_size.max(1),
            abort_on_error,
            sort_key: None,
        }
    }

    /// Ask the backend for a stable order so offset paging neither skips
    /// nor repeats records
    pub fn sorted_by(mut self, sort_key: Option<String>) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// Page through a collection until a short page comes back. A record
    /// served on more than one page is kept once.
    pub async fn read_all(&self, collection: &str) -> Result<CollectionRead, RosterSyncError> {
        let _tmr = timer!(Level::Trace; "EntityReader::read_all", "{}", collection);

        let mut read = CollectionRead {
            collection: collection.to_string(),
            ..Default::default()
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut repeated = 0usize;
        let mut skip = 0;

        loop {
            let page = match self
                .store
                .list(collection, self.sort_key.as_deref(), self.page_size, skip)
                .await
            {
                Ok(page) => page,
                Err(e) if self.abort_on_error => return Err(e),
                Err(e) => {
                    warn!(
                        "Read of {} stopped after {} records: {}",
                        collection,
                        read.records.len(),
                        e
                    );
                    read.interrupted = Some(e.to_string());
                    break;
                }
            };

            let page_len = page.len();
            skip += page_len;
            for record in page {
                if seen.insert(record.id.clone()) {
                    read.records.push(record);
                } else {
                    repeated += 1;
                }
            }
            if page_len < self.page_size {
                break;
            }
        }

        if repeated > 0 {
            warn!("{} records of {} were served twice and read once", repeated, collection);
        }

        debug!("Read {} records from {}", read.records.len(), collection);
        Ok(read)
    }
}

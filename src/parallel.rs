//! Multi-threaded region processing

use crate::record::AlignmentRecord;
use crate::refs::References;
use crate::region::Region;
use crate::Result;

/// Trait for types that process the records of many regions in parallel.
///
/// Every worker thread owns a clone of the processor. Regions are handled one
/// at a time per thread, so per-region state can be kept in the clone and
/// released in [`on_region_complete`](Self::on_region_complete).
///
/// See [`MmapReader::process_regions_parallel`](crate::MmapReader::process_regions_parallel).
pub trait RegionProcessor: Send + Clone {
    /// Process a single record overlapping the current region
    fn process_record(&mut self, record: &AlignmentRecord, refs: &References) -> Result<()>;

    /// Called when a thread finishes a region
    /// Default implementation does nothing
    #[allow(unused_variables)]
    fn on_region_complete(&mut self, region: &Region) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct NameCollector {
        current: Vec<String>,
        regions: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }
    impl RegionProcessor for NameCollector {
        fn process_record(&mut self, record: &AlignmentRecord, refs: &References) -> Result<()> {
            self.current
                .push(format!("{}@{}", record.qname(), record.rname(refs)?));
            Ok(())
        }
        fn on_region_complete(&mut self, region: &Region) -> Result<()> {
            let names = std::mem::take(&mut self.current);
            self.regions.lock().push((region.to_string(), names));
            Ok(())
        }
    }

    #[test]
    fn test_processor_state_per_region() {
        let mut refs = References::new();
        let mut record = AlignmentRecord::new();
        record.set_qname("r1");
        record.set_rname("chr1", &mut refs);

        let collector = NameCollector::default();
        let mut worker = collector.clone();
        worker.process_record(&record, &refs).unwrap();
        worker
            .on_region_complete(&"chr1:1-10".parse().unwrap())
            .unwrap();
        worker
            .on_region_complete(&"chr1:20-30".parse().unwrap())
            .unwrap();

        let regions = collector.regions.lock();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], ("chr1:1-10".to_string(), vec!["r1@chr1".to_string()]));
        assert!(regions[1].1.is_empty());
    }
}

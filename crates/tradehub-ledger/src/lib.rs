//! Append-only trade ledger.
//!
//! Every fill in the system lands here exactly once, with a monotonic
//! sequence number. Pages read newest-first against a sequence cursor,
//! so concurrent appends never shift or duplicate rows already
//! returned.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tradehub_core::types::TradeRecord;
use tracing::debug;

/// One page of ledger records, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePage {
    /// Records in this page, newest first
    pub records: Vec<TradeRecord>,
    /// Cursor for the next older page; `None` when exhausted
    pub next_cursor: Option<u64>,
}

/// In-process append-only trade history.
#[derive(Debug, Default)]
pub struct TradeLedger {
    // Index i holds the record with seq i + 1.
    records: Mutex<Vec<TradeRecord>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, assigning its sequence number.
    pub fn append(&self, mut record: TradeRecord) -> u64 {
        let mut records = self.records.lock().unwrap();
        let seq = records.len() as u64 + 1;
        record.seq = seq;
        debug!(
            seq,
            symbol = %record.symbol,
            side = %record.side,
            kind = %record.kind,
            "trade recorded"
        );
        records.push(record);
        seq
    }

    /// Read one page, newest first.
    ///
    /// `cursor` is the highest sequence number to include; `None`
    /// starts at the latest record. The returned `next_cursor` fetches
    /// the next older page.
    pub fn page(&self, cursor: Option<u64>, limit: usize) -> TradePage {
        let records = self.records.lock().unwrap();
        let len = records.len() as u64;
        let start = cursor.unwrap_or(len).min(len);

        let low = start.saturating_sub(limit as u64);
        let page: Vec<TradeRecord> = records[low as usize..start as usize]
            .iter()
            .rev()
            .cloned()
            .collect();

        let next_cursor = if low >= 1 { Some(low) } else { None };
        TradePage {
            records: page,
            next_cursor,
        }
    }

    /// The latest `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<TradeRecord> {
        self.page(None, n).records
    }

    /// The latest records for one symbol, newest first.
    pub fn by_symbol(&self, symbol: &str, limit: usize) -> Vec<TradeRecord> {
        let symbol = symbol.to_ascii_uppercase();
        let records = self.records.lock().unwrap();
        records
            .iter()
            .rev()
            .filter(|r| r.symbol == symbol)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tradehub_core::types::{Amount, ExchangeId, Order, OrderRequest, Side};

    fn record(symbol: &str) -> TradeRecord {
        let request = OrderRequest::market(
            format!("key-{symbol}"),
            symbol,
            Side::Buy,
            Amount::Quantity(dec!(1)),
            ExchangeId::Sim,
        );
        let order = Order::from_request(&request);
        TradeRecord::from_order(&order, dec!(1), dec!(100))
    }

    #[test]
    fn test_append_assigns_monotonic_seq() {
        let ledger = TradeLedger::new();
        assert_eq!(ledger.append(record("BTC")), 1);
        assert_eq!(ledger.append(record("ETH")), 2);
        assert_eq!(ledger.append(record("BTC")), 3);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_page_walks_newest_first() {
        let ledger = TradeLedger::new();
        for _ in 0..5 {
            ledger.append(record("BTC"));
        }

        let first = ledger.page(None, 2);
        assert_eq!(
            first.records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![5, 4]
        );
        assert_eq!(first.next_cursor, Some(3));

        let second = ledger.page(first.next_cursor, 2);
        assert_eq!(
            second.records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![3, 2]
        );
        assert_eq!(second.next_cursor, Some(1));

        let last = ledger.page(second.next_cursor, 2);
        assert_eq!(
            last.records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(last.next_cursor, None);
    }

    #[test]
    fn test_appends_between_pages_do_not_shift_rows() {
        let ledger = TradeLedger::new();
        for _ in 0..4 {
            ledger.append(record("BTC"));
        }

        let first = ledger.page(None, 2);
        assert_eq!(
            first.records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![4, 3]
        );

        // New records land above the cursor and stay out of the walk.
        ledger.append(record("ETH"));
        ledger.append(record("ETH"));

        let second = ledger.page(first.next_cursor, 2);
        assert_eq!(
            second.records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(second.next_cursor, None);
    }

    #[test]
    fn test_by_symbol_filter() {
        let ledger = TradeLedger::new();
        ledger.append(record("BTC"));
        ledger.append(record("ETH"));
        ledger.append(record("BTC"));

        let btc = ledger.by_symbol("btc", 10);
        assert_eq!(btc.len(), 2);
        assert_eq!(btc[0].seq, 3);
        assert!(btc.iter().all(|r| r.symbol == "BTC"));
    }

    #[test]
    fn test_concurrent_appends_stay_contiguous() {
        let ledger = Arc::new(TradeLedger::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    ledger.append(record("BTC"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 400);
        let mut seqs: Vec<u64> = Vec::new();
        let mut cursor = None;
        loop {
            let page = ledger.page(cursor, 64);
            seqs.extend(page.records.iter().map(|r| r.seq));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let expected: Vec<u64> = (1..=400).rev().collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_stale_cursor_is_clamped() {
        let ledger = TradeLedger::new();
        ledger.append(record("BTC"));
        let page = ledger.page(Some(99), 10);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next_cursor, None);
    }
}

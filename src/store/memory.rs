//! In-memory store backend
//!
//! Holds every collection in process memory behind a single RwLock. Used
//! when no database URL is configured and throughout the test suite; the
//! uniqueness invariants match the PostgreSQL backend exactly.

use super::{
    LatestScanInfo, P2shAddressRecord, RegisteredAddress, StoreError, StoreResult, SwapRecord,
    SwapResultRecord, SwapStatistics, SwapStatus, SwapStore,
};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

type ClassicKey = (String, String, String); // (pair_id, tx_id, bind)
type RouterKey = (String, String, u32); // (from_chain_id, tx_id, log_index)

#[derive(Default)]
struct Collections {
    swapins: HashMap<ClassicKey, SwapRecord>,
    swapouts: HashMap<ClassicKey, SwapRecord>,
    router_swaps: HashMap<RouterKey, SwapRecord>,
    swapin_results: HashMap<ClassicKey, SwapResultRecord>,
    swapout_results: HashMap<ClassicKey, SwapResultRecord>,
    router_swap_results: HashMap<RouterKey, SwapResultRecord>,
    p2sh_addresses: HashMap<String, P2shAddressRecord>,
    registered_addresses: HashMap<String, RegisteredAddress>,
    latest_scan: HashMap<bool, LatestScanInfo>,
}

#[derive(Default)]
pub struct MemSwapStore {
    inner: RwLock<Collections>,
}

impl MemSwapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn classic_key(tx_id: &str, pair_id: &str, bind: &str) -> ClassicKey {
    (pair_id.to_string(), tx_id.to_string(), bind.to_string())
}

fn insert_unique<K: std::hash::Hash + Eq, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
) -> StoreResult<()> {
    if map.contains_key(&key) {
        return Err(StoreError::Duplicate);
    }
    map.insert(key, value);
    Ok(())
}

fn page_results(
    mut results: Vec<SwapResultRecord>,
    offset: i64,
    limit: i64,
) -> Vec<SwapResultRecord> {
    results.sort_by_key(|r| r.timestamp);
    if limit < 0 {
        results.reverse();
    }
    results
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.unsigned_abs() as usize)
        .collect()
}

fn match_address(record_bind: &str, wanted: &str) -> bool {
    wanted == "all" || record_bind == wanted
}

#[async_trait]
impl SwapStore for MemSwapStore {
    async fn add_swapin(&self, swap: &SwapRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = classic_key(&swap.tx_id, &swap.pair_id, &swap.bind);
        insert_unique(&mut inner.swapins, key, swap.clone())
    }

    async fn add_swapout(&self, swap: &SwapRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = classic_key(&swap.tx_id, &swap.pair_id, &swap.bind);
        insert_unique(&mut inner.swapouts, key, swap.clone())
    }

    async fn add_router_swap(&self, swap: &SwapRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = (
            swap.from_chain_id.clone(),
            swap.tx_id.clone(),
            swap.log_index,
        );
        insert_unique(&mut inner.router_swaps, key, swap.clone())
    }

    async fn find_swapin(&self, tx_id: &str, pair_id: &str, bind: &str) -> StoreResult<SwapRecord> {
        self.inner
            .read()
            .await
            .swapins
            .get(&classic_key(tx_id, pair_id, bind))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_swapout(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapRecord> {
        self.inner
            .read()
            .await
            .swapouts
            .get(&classic_key(tx_id, pair_id, bind))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_router_swap(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapRecord> {
        self.inner
            .read()
            .await
            .router_swaps
            .get(&(from_chain_id.to_string(), tx_id.to_string(), log_index))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_swapin_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let swap = inner
            .swapins
            .get_mut(&classic_key(tx_id, pair_id, bind))
            .ok_or(StoreError::NotFound)?;
        swap.status = status;
        swap.timestamp = timestamp;
        if let Some(memo) = memo {
            swap.memo = memo.to_string();
        }
        Ok(())
    }

    async fn update_swapout_status(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
        status: SwapStatus,
        timestamp: i64,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let swap = inner
            .swapouts
            .get_mut(&classic_key(tx_id, pair_id, bind))
            .ok_or(StoreError::NotFound)?;
        swap.status = status;
        swap.timestamp = timestamp;
        if let Some(memo) = memo {
            swap.memo = memo.to_string();
        }
        Ok(())
    }

    async fn add_swapin_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = classic_key(&result.tx_id, &result.pair_id, &result.bind);
        insert_unique(&mut inner.swapin_results, key, result.clone())
    }

    async fn add_swapout_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = classic_key(&result.tx_id, &result.pair_id, &result.bind);
        insert_unique(&mut inner.swapout_results, key, result.clone())
    }

    async fn add_router_swap_result(&self, result: &SwapResultRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = (
            result.from_chain_id.clone(),
            result.tx_id.clone(),
            result.log_index,
        );
        insert_unique(&mut inner.router_swap_results, key, result.clone())
    }

    async fn find_swapin_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord> {
        self.inner
            .read()
            .await
            .swapin_results
            .get(&classic_key(tx_id, pair_id, bind))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_swapout_result(
        &self,
        tx_id: &str,
        pair_id: &str,
        bind: &str,
    ) -> StoreResult<SwapResultRecord> {
        self.inner
            .read()
            .await
            .swapout_results
            .get(&classic_key(tx_id, pair_id, bind))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_router_swap_result(
        &self,
        from_chain_id: &str,
        tx_id: &str,
        log_index: u32,
    ) -> StoreResult<SwapResultRecord> {
        self.inner
            .read()
            .await
            .router_swap_results
            .get(&(from_chain_id.to_string(), tx_id.to_string(), log_index))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_swapin_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        let inner = self.inner.read().await;
        let matched = inner
            .swapin_results
            .values()
            .filter(|r| r.pair_id == pair_id && match_address(&r.bind, address))
            .cloned()
            .collect();
        Ok(page_results(matched, offset, limit))
    }

    async fn find_swapout_results(
        &self,
        address: &str,
        pair_id: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        let inner = self.inner.read().await;
        let matched = inner
            .swapout_results
            .values()
            .filter(|r| r.pair_id == pair_id && match_address(&r.bind, address))
            .cloned()
            .collect();
        Ok(page_results(matched, offset, limit))
    }

    async fn find_router_swap_results(
        &self,
        from_chain_id: &str,
        address: &str,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<SwapResultRecord>> {
        let inner = self.inner.read().await;
        let matched = inner
            .router_swap_results
            .values()
            .filter(|r| r.from_chain_id == from_chain_id && match_address(&r.bind, address))
            .cloned()
            .collect();
        Ok(page_results(matched, offset, limit))
    }

    async fn add_p2sh_address(&self, record: &P2shAddressRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.p2sh_addresses.contains_key(&record.bind_address) {
            return Err(StoreError::Duplicate);
        }
        inner
            .p2sh_addresses
            .insert(record.bind_address.clone(), record.clone());
        Ok(())
    }

    async fn find_p2sh_address(&self, bind_address: &str) -> StoreResult<P2shAddressRecord> {
        self.inner
            .read()
            .await
            .p2sh_addresses
            .get(bind_address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_p2sh_bind_address(&self, p2sh_address: &str) -> StoreResult<String> {
        self.inner
            .read()
            .await
            .p2sh_addresses
            .values()
            .find(|r| r.p2sh_address == p2sh_address)
            .map(|r| r.bind_address.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn add_registered_address(&self, address: &str, timestamp: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.registered_addresses.contains_key(address) {
            return Err(StoreError::Duplicate);
        }
        inner.registered_addresses.insert(
            address.to_string(),
            RegisteredAddress {
                address: address.to_string(),
                timestamp,
            },
        );
        Ok(())
    }

    async fn find_registered_address(&self, address: &str) -> StoreResult<RegisteredAddress> {
        self.inner
            .read()
            .await
            .registered_addresses
            .get(address)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_latest_scan_info(&self, is_src: bool) -> StoreResult<LatestScanInfo> {
        self.inner
            .read()
            .await
            .latest_scan
            .get(&is_src)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_latest_scan_info(&self, is_src: bool, block_height: u64) -> StoreResult<()> {
        self.inner.write().await.latest_scan.insert(
            is_src,
            LatestScanInfo {
                is_src,
                block_height,
                timestamp: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn get_swap_statistics(&self, pair_id: &str) -> StoreResult<SwapStatistics> {
        let inner = self.inner.read().await;
        Ok(SwapStatistics {
            pair_id: pair_id.to_string(),
            swapin_count: inner
                .swapin_results
                .values()
                .filter(|r| r.pair_id == pair_id)
                .count() as u64,
            swapout_count: inner
                .swapout_results
                .values()
                .filter(|r| r.pair_id == pair_id)
                .count() as u64,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SwapTxType;

    fn swap(pair_id: &str, tx_id: &str, bind: &str) -> SwapRecord {
        SwapRecord {
            pair_id: pair_id.into(),
            tx_id: tx_id.into(),
            tx_to: "0xdeposit".into(),
            tx_type: SwapTxType::Swapin,
            bind: bind.into(),
            status: SwapStatus::TxNotStable,
            timestamp: 1_700_000_000,
            memo: String::new(),
            for_native: false,
            for_underlying: false,
            token: String::new(),
            path: Vec::new(),
            amount_out_min: String::new(),
            from_chain_id: String::new(),
            to_chain_id: String::new(),
            log_index: 0,
        }
    }

    fn router_swap(from_chain_id: &str, tx_id: &str, log_index: u32) -> SwapRecord {
        let mut s = swap("ROUTER", tx_id, "0xbob");
        s.tx_type = SwapTxType::RouterSwap;
        s.from_chain_id = from_chain_id.into();
        s.to_chain_id = "1".into();
        s.log_index = log_index;
        s
    }

    fn result(pair_id: &str, tx_id: &str, bind: &str, timestamp: i64) -> SwapResultRecord {
        SwapResultRecord {
            pair_id: pair_id.into(),
            tx_id: tx_id.into(),
            tx_to: "0xdeposit".into(),
            tx_type: SwapTxType::Swapin,
            bind: bind.into(),
            status: SwapStatus::MatchTxStable,
            timestamp,
            memo: String::new(),
            swap_tx: format!("0xmatch-{tx_id}"),
            value: "1000".into(),
            swap_height: 100,
            swap_time: timestamp,
            swap_nonce: 1,
            from_chain_id: String::new(),
            to_chain_id: String::new(),
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn duplicate_swapin_is_rejected() {
        let store = MemSwapStore::new();
        store.add_swapin(&swap("USDC", "0xa", "0xbob")).await.unwrap();
        let err = store
            .add_swapin(&swap("USDC", "0xa", "0xbob"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));

        // Different bind is a different swap.
        store
            .add_swapin(&swap("USDC", "0xa", "0xalice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn router_swaps_coexist_per_log_index() {
        let store = MemSwapStore::new();
        store.add_router_swap(&router_swap("56", "0xt", 0)).await.unwrap();
        store.add_router_swap(&router_swap("56", "0xt", 3)).await.unwrap();
        let err = store
            .add_router_swap(&router_swap("56", "0xt", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));

        assert_eq!(store.find_router_swap("56", "0xt", 0).await.unwrap().log_index, 0);
        assert_eq!(store.find_router_swap("56", "0xt", 3).await.unwrap().log_index, 3);
        assert!(store.find_router_swap("56", "0xt", 1).await.is_err());
    }

    #[tokio::test]
    async fn status_update_sets_memo_only_when_given() {
        let store = MemSwapStore::new();
        let mut s = swap("USDC", "0xa", "0xbob");
        s.status = SwapStatus::TxWithWrongMemo;
        s.memo = "wrong memo".into();
        store.add_swapin(&s).await.unwrap();

        store
            .update_swapin_status("0xa", "USDC", "0xbob", SwapStatus::TxWithWrongMemo, 2, None)
            .await
            .unwrap();
        let found = store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(found.memo, "wrong memo");

        store
            .update_swapin_status("0xa", "USDC", "0xbob", SwapStatus::TxNotStable, 3, Some(""))
            .await
            .unwrap();
        let found = store.find_swapin("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(found.status, SwapStatus::TxNotStable);
        assert!(found.memo.is_empty());
    }

    #[tokio::test]
    async fn history_paginates_and_orders_by_limit_sign() {
        let store = MemSwapStore::new();
        for i in 0..5 {
            store
                .add_swapin_result(&result("USDC", &format!("0x{i}"), "0xbob", 1000 + i))
                .await
                .unwrap();
        }

        let asc = store.find_swapin_results("0xbob", "USDC", 0, 3).await.unwrap();
        assert_eq!(asc.len(), 3);
        assert_eq!(asc[0].tx_id, "0x0");

        let desc = store.find_swapin_results("0xbob", "USDC", 0, -2).await.unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc[0].tx_id, "0x4");

        let offset = store.find_swapin_results("0xbob", "USDC", 4, 10).await.unwrap();
        assert_eq!(offset.len(), 1);
        assert_eq!(offset[0].tx_id, "0x4");

        let wildcard = store.find_swapin_results("all", "USDC", 0, 100).await.unwrap();
        assert_eq!(wildcard.len(), 5);

        let other = store.find_swapin_results("0xeve", "USDC", 0, 100).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn statistics_count_results_per_pair() {
        let store = MemSwapStore::new();
        store.add_swapin_result(&result("USDC", "0x1", "0xbob", 1)).await.unwrap();
        store.add_swapin_result(&result("USDC", "0x2", "0xbob", 2)).await.unwrap();
        store.add_swapout_result(&result("USDC", "0x3", "0xbob", 3)).await.unwrap();
        store.add_swapin_result(&result("DAI", "0x4", "0xbob", 4)).await.unwrap();

        let stats = store.get_swap_statistics("USDC").await.unwrap();
        assert_eq!(stats.swapin_count, 2);
        assert_eq!(stats.swapout_count, 1);
    }

    #[tokio::test]
    async fn swapout_status_updates_mirror_swapins() {
        let store = MemSwapStore::new();
        let mut s = swap("USDC", "0xa", "0xbob");
        s.tx_type = SwapTxType::Swapout;
        store.add_swapout(&s).await.unwrap();

        store
            .update_swapout_status("0xa", "USDC", "0xbob", SwapStatus::Processing, 2, None)
            .await
            .unwrap();
        let found = store.find_swapout("0xa", "USDC", "0xbob").await.unwrap();
        assert_eq!(found.status, SwapStatus::Processing);

        let missing = store
            .update_swapout_status("0xmissing", "USDC", "0xbob", SwapStatus::Processing, 2, None)
            .await;
        assert!(matches!(missing.unwrap_err(), StoreError::NotFound));
    }

    #[tokio::test]
    async fn latest_scan_info_upserts_per_direction() {
        let store = MemSwapStore::new();
        assert!(store.get_latest_scan_info(true).await.is_err());

        store.update_latest_scan_info(true, 100).await.unwrap();
        store.update_latest_scan_info(true, 200).await.unwrap();
        store.update_latest_scan_info(false, 50).await.unwrap();

        assert_eq!(store.get_latest_scan_info(true).await.unwrap().block_height, 200);
        assert_eq!(store.get_latest_scan_info(false).await.unwrap().block_height, 50);
    }

    #[tokio::test]
    async fn p2sh_mapping_is_bidirectional() {
        let store = MemSwapStore::new();
        let record = P2shAddressRecord {
            bind_address: "0xbob".into(),
            p2sh_address: "3P2shAddr".into(),
        };
        store.add_p2sh_address(&record).await.unwrap();
        assert!(matches!(
            store.add_p2sh_address(&record).await.unwrap_err(),
            StoreError::Duplicate
        ));
        assert_eq!(
            store.find_p2sh_address("0xbob").await.unwrap().p2sh_address,
            "3P2shAddr"
        );
        assert_eq!(store.find_p2sh_bind_address("3P2shAddr").await.unwrap(), "0xbob");
        assert!(store.find_p2sh_bind_address("3Unknown").await.is_err());
    }
}

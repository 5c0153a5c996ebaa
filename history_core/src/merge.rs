//! Folds the three explorer feeds into one record per transaction hash.
//!
//! Records are created in feed order (external, internal, token) and every
//! later effect for an already-known hash is appended to that record's
//! `state_changes`. The hash index spans all three passes.

use crate::{
    MethodLabel, NativeCurrency, StateChange, StateChangeKind, TokenInfo, TransactionRecord,
    NATIVE_TOKEN_ADDRESS,
};
use explorer_client::{ExternalTransaction, InternalTransaction, TokenTransfer};
use std::collections::{HashMap, HashSet};
use token_resolver::{TokenSymbolResolver, UNKNOWN_SYMBOL};
use tracing::{debug, info};

/// Identity of an effect inside one transaction, when the explorer gives one.
#[derive(Debug, Hash, PartialEq, Eq)]
enum EffectKey {
    Internal { hash: String, trace_id: String },
    Token { hash: String, log_index: u64 },
}

struct MergeState<'a> {
    tracked: String,
    native: &'a NativeCurrency,
    records: Vec<TransactionRecord>,
    index: HashMap<String, usize>,
    seen_effects: HashSet<EffectKey>,
    skipped: usize,
    /// External executions that reverted but still consumed a nonce
    reverted: usize,
}

impl<'a> MergeState<'a> {
    fn new(tracked: &str, native: &'a NativeCurrency) -> Self {
        Self {
            tracked: tracked.to_lowercase(),
            native,
            records: Vec::new(),
            index: HashMap::new(),
            seen_effects: HashSet::new(),
            skipped: 0,
            reverted: 0,
        }
    }

    fn touches(&self, from: &str, to: &str) -> bool {
        from.eq_ignore_ascii_case(&self.tracked) || to.eq_ignore_ascii_case(&self.tracked)
    }

    fn is_outgoing(&self, from: &str) -> bool {
        from.eq_ignore_ascii_case(&self.tracked)
    }

    /// Returns false when the effect was already merged from an overlapping row.
    fn first_sighting(&mut self, key: Option<EffectKey>) -> bool {
        match key {
            Some(key) => self.seen_effects.insert(key),
            None => true,
        }
    }

    fn native_change(&self, kind: StateChangeKind, from: &str, to: &str, value: &str) -> StateChange {
        StateChange {
            kind,
            token_address: NATIVE_TOKEN_ADDRESS.to_string(),
            token_symbol: self.native.symbol.clone(),
            token_decimals: self.native.decimals,
            from: from.to_string(),
            to: to.to_string(),
            value: value.to_string(),
        }
    }

    fn insert(&mut self, record: TransactionRecord) {
        self.index.insert(record.tx_hash.clone(), self.records.len());
        self.records.push(record);
    }

    fn get_mut(&mut self, hash: &str) -> Option<&mut TransactionRecord> {
        let position = *self.index.get(hash)?;
        self.records.get_mut(position)
    }

    fn add_external(&mut self, tx: &ExternalTransaction) {
        let hash = tx.hash.to_lowercase();
        if !self.touches(&tx.from, &tx.to) {
            self.skipped += 1;
            return;
        }
        if self.index.contains_key(&hash) {
            debug!("Duplicate external row for {}", hash);
            return;
        }
        if tx.failed() {
            debug!("External {} reverted, kept as an executed record", hash);
            self.reverted += 1;
        }

        let method = if self.is_outgoing(&tx.from) {
            MethodLabel::OutgoingTransaction
        } else {
            MethodLabel::IncomingTransaction
        };
        let change = self.native_change(StateChangeKind::Native, &tx.from, &tx.to, &tx.value);

        self.insert(TransactionRecord {
            tx_hash: hash,
            timestamp: tx.timestamp,
            block_number: tx.block_number,
            nonce: tx.nonce,
            to: tx.to.clone(),
            from: tx.from.clone(),
            data: if tx.input.is_empty() { "0x".to_string() } else { tx.input.clone() },
            operation: 0,
            value: tx.value.clone(),
            is_executed: true,
            method: method.to_string(),
            token_info: None,
            state_changes: vec![change],
        });
    }

    fn add_internal(&mut self, tx: &InternalTransaction) {
        let hash = tx.hash.to_lowercase();
        if !self.touches(&tx.from, &tx.to) {
            self.skipped += 1;
            return;
        }

        let key = (!tx.trace_id.is_empty()).then(|| EffectKey::Internal {
            hash: hash.clone(),
            trace_id: tx.trace_id.clone(),
        });
        if !self.first_sighting(key) {
            debug!("Duplicate internal effect {} in {}", tx.trace_id, hash);
            return;
        }

        let change = self.native_change(StateChangeKind::Internal, &tx.from, &tx.to, &tx.value);
        if let Some(record) = self.get_mut(&hash) {
            record.state_changes.push(change);
            return;
        }

        // Safe executions often only show up here: the owner that signed the
        // outer transaction is not the tracked address.
        let method = if self.is_outgoing(&tx.from) {
            MethodLabel::InternalOutgoing
        } else {
            MethodLabel::InternalIncoming
        };
        self.insert(TransactionRecord {
            tx_hash: hash,
            timestamp: tx.timestamp,
            block_number: tx.block_number,
            nonce: 0,
            to: tx.to.clone(),
            from: tx.from.clone(),
            data: "0x".to_string(),
            operation: 0,
            value: tx.value.clone(),
            is_executed: true,
            method: method.to_string(),
            token_info: None,
            state_changes: vec![change],
        });
    }

    fn add_token_transfer(&mut self, transfer: &TokenTransfer, symbols: &HashMap<String, String>) {
        let hash = transfer.hash.to_lowercase();
        if !self.touches(&transfer.from, &transfer.to) {
            self.skipped += 1;
            return;
        }

        let key = transfer.log_index.map(|log_index| EffectKey::Token {
            hash: hash.clone(),
            log_index,
        });
        if !self.first_sighting(key) {
            debug!("Duplicate token effect in {}", hash);
            return;
        }

        let token_address = transfer.contract_address.to_lowercase();
        let symbol = if transfer.token_symbol.is_empty() {
            symbols
                .get(&token_address)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string())
        } else {
            transfer.token_symbol.clone()
        };

        let change = StateChange {
            kind: StateChangeKind::Token,
            token_address: token_address.clone(),
            token_symbol: symbol.clone(),
            token_decimals: transfer.token_decimals,
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            value: transfer.value.clone(),
        };

        if let Some(record) = self.get_mut(&hash) {
            record.state_changes.push(change);
            return;
        }

        let method = if self.is_outgoing(&transfer.from) {
            MethodLabel::TokenOutgoing
        } else {
            MethodLabel::TokenIncoming
        };
        self.insert(TransactionRecord {
            tx_hash: hash,
            timestamp: transfer.timestamp,
            block_number: transfer.block_number,
            nonce: transfer.nonce,
            to: transfer.to.clone(),
            from: transfer.from.clone(),
            data: "0x".to_string(),
            operation: 0,
            value: "0".to_string(),
            is_executed: true,
            method: method.to_string(),
            token_info: Some(TokenInfo {
                address: token_address,
                symbol,
                decimals: transfer.token_decimals,
                name: transfer.token_name.clone(),
            }),
            state_changes: vec![change],
        });
    }
}

/// Merge the three feeds for `tracked` into deduplicated, unsorted records.
///
/// `symbols` maps lower-case token addresses to symbols for transfers the
/// explorer left unlabelled; missing entries become [`UNKNOWN_SYMBOL`].
pub fn merge_records(
    external: &[ExternalTransaction],
    internal: &[InternalTransaction],
    token_transfers: &[TokenTransfer],
    tracked: &str,
    native: &NativeCurrency,
    symbols: &HashMap<String, String>,
) -> Vec<TransactionRecord> {
    let mut state = MergeState::new(tracked, native);

    for tx in external {
        state.add_external(tx);
    }
    for tx in internal {
        state.add_internal(tx);
    }
    for transfer in token_transfers {
        state.add_token_transfer(transfer, symbols);
    }

    debug!(
        "Merged {} external, {} internal, {} token rows into {} records ({} reverted, {} rows not touching {})",
        external.len(),
        internal.len(),
        token_transfers.len(),
        state.records.len(),
        state.reverted,
        state.skipped,
        state.tracked
    );

    state.records
}

/// Merge front-end that resolves missing token symbols before folding.
#[derive(Clone)]
pub struct MergeEngine {
    resolver: TokenSymbolResolver,
}

impl MergeEngine {
    pub fn new(resolver: TokenSymbolResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TokenSymbolResolver {
        &self.resolver
    }

    pub async fn merge(
        &self,
        external: &[ExternalTransaction],
        internal: &[InternalTransaction],
        token_transfers: &[TokenTransfer],
        tracked: &str,
        chain_id: u64,
        native: &NativeCurrency,
    ) -> Vec<TransactionRecord> {
        let mut missing = Vec::new();
        for transfer in token_transfers {
            if !transfer.from.eq_ignore_ascii_case(tracked) && !transfer.to.eq_ignore_ascii_case(tracked) {
                continue;
            }
            if transfer.token_symbol.is_empty() {
                missing.push(transfer.contract_address.clone());
            } else {
                self.resolver
                    .remember(&transfer.contract_address, chain_id, &transfer.token_symbol);
            }
        }

        let symbols = self.resolver.resolve_many(missing, chain_id).await;
        if !symbols.is_empty() {
            info!("Resolved {} unlabelled token symbols on chain {}", symbols.len(), chain_id);
        }

        merge_records(external, internal, token_transfers, tracked, native, &symbols)
    }
}

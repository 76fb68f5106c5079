//! Transaction signer and sender for lending operations.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! The sender uses the provider's recommended fillers for nonce, gas limit
//! and fee, and waits for the receipt before returning.

use crate::error::{parse_url, ChainError};
use crate::protocol::TxReceipt;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Signs and submits transactions from a single local key.
pub struct TransactionSender {
    /// RPC URL for sending transactions
    rpc_url: String,
    /// Signer wallet
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("rpc_url", &self.rpc_url)
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl TransactionSender {
    /// Create a sender from a hex private key (with or without 0x prefix).
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self, ChainError> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str
            .parse()
            .map_err(|e| ChainError::InvalidKey(format!("{e}")))?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        // Validate the endpoint up front.
        parse_url(rpc_url)?;

        info!(address = %address, chain_id, "Transaction sender initialized");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet,
            address,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Send a transaction and wait for its receipt.
    ///
    /// A mined transaction with failed status is reported as
    /// [`ChainError::Reverted`].
    pub async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
        operation: &'static str,
    ) -> Result<TxReceipt, ChainError> {
        let start = Instant::now();

        debug!(
            to = %to,
            operation,
            calldata_len = calldata.len(),
            value = %value,
            "Preparing transaction"
        );

        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_chain_id(self.chain_id);

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(parse_url(&self.rpc_url)?);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(ChainError::rpc)?;
        let tx_hash = *pending.tx_hash();

        info!(tx_hash = %tx_hash, operation, "Transaction submitted, waiting for confirmation");

        let receipt = pending.get_receipt().await.map_err(ChainError::rpc)?;
        let elapsed_ms = start.elapsed().as_millis();

        let result = TxReceipt {
            status: receipt.status(),
            transaction_hash: tx_hash,
            gas_used: receipt.gas_used,
        };

        if result.status {
            info!(
                tx_hash = %tx_hash,
                operation,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = elapsed_ms,
                "Transaction confirmed"
            );
        } else {
            warn!(tx_hash = %tx_hash, operation, total_ms = elapsed_ms, "Transaction reverted");
        }

        result.ensure_success(operation)
    }
}

//! `ChainClient` over an ethers JSON-RPC provider.

use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{
    Http, JsonRpcError, Middleware, MiddlewareError, Provider, ProviderError, RpcError,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{BlockId, BlockNumber, Filter, TransactionRequest, H160, H256};
use ethers::types::U256 as EthU256;
use relay_client::{
    Block, BlockRef, BlockTransaction, CallRequest, ChainClient, ChainError, ChainLog, LogFilter,
    Transaction, TxRequest,
};
use relay_core::{Header, Log, Receipt, ReceiptOutcome};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EthersChainClient {
    provider: Provider<Http>,
    signer: Option<SignerClient>,
    chain_id: u64,
}

impl EthersChainClient {
    /// Read-only client.
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("invalid rpc url: {rpc_url}"))?;
        Ok(Self {
            provider,
            signer: None,
            chain_id,
        })
    }

    /// Client that can also sign and send transactions from `private_key`.
    pub fn with_signer(rpc_url: &str, chain_id: u64, private_key: &str) -> Result<Self> {
        let mut client = Self::new(rpc_url, chain_id)?;
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .context("failed parsing private key")?
            .with_chain_id(chain_id);
        client.signer = Some(SignerMiddleware::new(client.provider.clone(), wallet));
        Ok(client)
    }

    /// Address of the configured signer.
    pub fn account(&self) -> Option<Address> {
        self.signer
            .as_ref()
            .map(|s| Address::from(s.signer().address().0))
    }
}

fn unavailable(err: impl std::fmt::Display) -> ChainError {
    ChainError::Unavailable(err.to_string())
}

fn revert(rpc: &JsonRpcError) -> Option<ChainError> {
    rpc.is_revert().then(|| ChainError::Reverted {
        message: rpc.message.clone(),
        data: rpc
            .as_revert_data()
            .map(|d| Bytes::from(d.to_vec()))
            .unwrap_or_default(),
    })
}

fn provider_error(err: ProviderError) -> ChainError {
    RpcError::as_error_response(&err)
        .and_then(revert)
        .unwrap_or_else(|| unavailable(err))
}

fn missing(what: &str) -> ChainError {
    ChainError::Decode(format!("node response is missing {what}"))
}

fn to_h160(a: Address) -> H160 {
    H160(a.0 .0)
}

fn to_h256(h: B256) -> H256 {
    H256(h.0)
}

fn to_eth_u256(v: U256) -> EthU256 {
    EthU256::from_big_endian(&v.to_be_bytes::<32>())
}

fn from_eth_u256(v: EthU256) -> U256 {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

fn to_u64(v: EthU256, what: &str) -> Result<u64, ChainError> {
    if v > EthU256::from(u64::MAX) {
        return Err(ChainError::Decode(format!("{what} {v} exceeds u64")));
    }
    Ok(v.as_u64())
}

fn block_id(block: BlockRef) -> BlockId {
    match block {
        BlockRef::Hash(hash) => BlockId::Hash(to_h256(hash)),
        BlockRef::Number(n) => BlockId::Number(BlockNumber::Number(n.into())),
        BlockRef::Latest => BlockId::Number(BlockNumber::Latest),
    }
}

fn convert_header(
    block: &ethers::types::Block<ethers::types::Transaction>,
) -> Result<Header, ChainError> {
    Ok(Header {
        parent_hash: B256::from(block.parent_hash.0),
        uncle_hash: B256::from(block.uncles_hash.0),
        coinbase: Address::from(block.author.ok_or_else(|| missing("miner"))?.0),
        state_root: B256::from(block.state_root.0),
        transactions_root: B256::from(block.transactions_root.0),
        receipts_root: B256::from(block.receipts_root.0),
        logs_bloom: Bloom::from_slice(
            block
                .logs_bloom
                .ok_or_else(|| missing("logsBloom"))?
                .as_bytes(),
        ),
        difficulty: from_eth_u256(block.difficulty),
        number: block.number.ok_or_else(|| missing("number"))?.as_u64(),
        gas_limit: to_u64(block.gas_limit, "gasLimit")?,
        gas_used: to_u64(block.gas_used, "gasUsed")?,
        timestamp: to_u64(block.timestamp, "timestamp")?,
        extra_data: Bytes::from(block.extra_data.to_vec()),
        mix_digest: B256::from(block.mix_hash.ok_or_else(|| missing("mixHash"))?.0),
        nonce: B64::from(block.nonce.ok_or_else(|| missing("nonce"))?.0),
    })
}

fn convert_receipt(r: ethers::types::TransactionReceipt) -> Result<Receipt, ChainError> {
    let outcome = match (r.status, r.root) {
        (Some(status), _) => ReceiptOutcome::Status(status.as_u64() == 1),
        (None, Some(root)) => ReceiptOutcome::PostState(B256::from(root.0)),
        (None, None) => return Err(missing("status and root")),
    };
    let tx_type = match r.transaction_type {
        Some(t) => u8::try_from(t.as_u64())
            .map_err(|_| ChainError::Decode(format!("transaction type {t} out of range")))?,
        None => 0,
    };
    Ok(Receipt {
        transaction_hash: B256::from(r.transaction_hash.0),
        transaction_index: r.transaction_index.as_u64(),
        block_hash: B256::from(r.block_hash.ok_or_else(|| missing("blockHash"))?.0),
        block_number: r.block_number.ok_or_else(|| missing("blockNumber"))?.as_u64(),
        tx_type,
        outcome,
        cumulative_gas_used: to_u64(r.cumulative_gas_used, "cumulativeGasUsed")?,
        logs_bloom: Bloom::from_slice(r.logs_bloom.as_bytes()),
        logs: r
            .logs
            .into_iter()
            .map(|log| Log {
                address: Address::from(log.address.0),
                topics: log.topics.iter().map(|t| B256::from(t.0)).collect(),
                data: Bytes::from(log.data.to_vec()),
            })
            .collect(),
    })
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let n = self
            .provider
            .get_block_number()
            .await
            .map_err(provider_error)?;
        Ok(n.as_u64())
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        let balance = self
            .provider
            .get_balance(to_h160(account), None)
            .await
            .map_err(provider_error)?;
        Ok(from_eth_u256(balance))
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        let nonce = self
            .provider
            .get_transaction_count(to_h160(account), Some(BlockNumber::Pending.into()))
            .await
            .map_err(provider_error)?;
        to_u64(nonce, "nonce")
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(provider_error)?;
        Ok(from_eth_u256(price))
    }

    async fn block(&self, id: BlockRef) -> Result<Option<Block>, ChainError> {
        let Some(block) = self
            .provider
            .get_block_with_txs(block_id(id))
            .await
            .map_err(provider_error)?
        else {
            return Ok(None);
        };
        let header = convert_header(&block)?;
        let hash = B256::from(block.hash.ok_or_else(|| missing("hash"))?.0);
        let transactions = block
            .transactions
            .iter()
            .map(|tx| BlockTransaction {
                hash: B256::from(tx.hash.0),
                raw: Bytes::from(tx.rlp().to_vec()),
            })
            .collect();
        Ok(Some(Block {
            hash,
            header,
            transactions,
        }))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<Transaction>, ChainError> {
        let tx = self
            .provider
            .get_transaction(to_h256(hash))
            .await
            .map_err(provider_error)?;
        Ok(tx.map(|tx| Transaction {
            hash: B256::from(tx.hash.0),
            from: Address::from(tx.from.0),
            to: tx.to.map(|to| Address::from(to.0)),
            value: from_eth_u256(tx.value),
            input: Bytes::from(tx.input.to_vec()),
            block_number: tx.block_number.map(|n| n.as_u64()),
        }))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>, ChainError> {
        self.provider
            .get_transaction_receipt(to_h256(hash))
            .await
            .map_err(provider_error)?
            .map(convert_receipt)
            .transpose()
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, ChainError> {
        let eth_filter = Filter::new()
            .address(to_h160(filter.address))
            .topic0(to_h256(filter.topic0))
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        let logs = self
            .provider
            .get_logs(&eth_filter)
            .await
            .map_err(provider_error)?;
        logs.into_iter()
            .map(|log| {
                let block_number = log.block_number.ok_or_else(|| missing("log blockNumber"))?;
                let tx_hash = log
                    .transaction_hash
                    .ok_or_else(|| missing("log transactionHash"))?;
                let log_index = log.log_index.ok_or_else(|| missing("logIndex"))?;
                Ok(ChainLog {
                    address: Address::from(log.address.0),
                    topics: log.topics.iter().map(|t| B256::from(t.0)).collect(),
                    data: Bytes::from(log.data.to_vec()),
                    block_number: block_number.as_u64(),
                    transaction_hash: B256::from(tx_hash.0),
                    log_index: to_u64(log_index, "logIndex")?,
                })
            })
            .collect()
    }

    async fn call(&self, call: &CallRequest, block: Option<u64>) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(to_h160(call.from))
            .to(to_h160(call.to))
            .data(call.data.to_vec())
            .value(to_eth_u256(call.value))
            .into();
        let at = block.map(|n| BlockId::Number(BlockNumber::Number(n.into())));
        let out = self
            .provider
            .call(&tx, at)
            .await
            .map_err(provider_error)?;
        Ok(Bytes::from(out.to_vec()))
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, ChainError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ChainError::Unavailable("no signer configured".to_string()))?;
        let request = TransactionRequest::new()
            .from(to_h160(tx.from))
            .to(to_h160(tx.to))
            .data(tx.data.to_vec())
            .value(to_eth_u256(tx.value))
            .nonce(tx.nonce)
            .gas_price(to_eth_u256(tx.gas_price))
            .chain_id(self.chain_id);
        let pending = signer
            .send_transaction(request, None)
            .await
            .map_err(|err| {
                MiddlewareError::as_error_response(&err)
                    .and_then(revert)
                    .unwrap_or_else(|| unavailable(err))
            })?;
        Ok(B256::from(pending.tx_hash().0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_conversion_is_lossless() {
        let v = U256::from_be_bytes([0xfe; 32]);
        assert_eq!(from_eth_u256(to_eth_u256(v)), v);
        assert_eq!(to_eth_u256(U256::from(7u64)), EthU256::from(7u64));
    }

    #[test]
    fn oversized_quantities_are_decode_errors() {
        assert_eq!(to_u64(EthU256::from(5u64), "x").unwrap(), 5);
        assert!(matches!(
            to_u64(EthU256::from(u64::MAX) + 1, "gasLimit"),
            Err(ChainError::Decode(_))
        ));
    }

    #[test]
    fn signer_address_comes_from_key() {
        let key = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let client = EthersChainClient::with_signer("http://127.0.0.1:8545", 1, key).unwrap();
        assert_eq!(
            client.account().unwrap(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".parse::<Address>().unwrap()
        );
        assert!(EthersChainClient::new("http://127.0.0.1:8545", 1)
            .unwrap()
            .account()
            .is_none());
    }

    fn mainnet_block_one() -> serde_json::Value {
        serde_json::json!({
            "hash": "0x88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6",
            "parentHash": "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3",
            "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            "miner": "0x05a56e2d52c817161883f50c441c3228cfe54d9f",
            "stateRoot": "0xd67e4d450343046425ae4271474353857ab860dbc0a1dde64b41b5cd3a532bf3",
            "transactionsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "receiptsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "logsBloom": "0x00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000",
            "difficulty": "0x3ff800000",
            "totalDifficulty": "0x7ff800000",
            "number": "0x1",
            "gasLimit": "0x1388",
            "gasUsed": "0x0",
            "timestamp": "0x55ba4224",
            "extraData": "0x476574682f76312e302e302f6c696e75782f676f312e342e32",
            "mixHash": "0x969b900de27b6ac6a67742365dd65f55a0526c41fd18e1b16f1a1215c2e66f59",
            "nonce": "0x539bd4979fef1ec4",
            "size": "0x219",
            "uncles": [],
            "transactions": []
        })
    }

    #[test]
    fn node_block_converts_to_matching_header() {
        let block: ethers::types::Block<ethers::types::Transaction> =
            serde_json::from_value(mainnet_block_one()).unwrap();
        let header = convert_header(&block).unwrap();

        assert_eq!(header.hash(), B256::from(block.hash.unwrap().0));
        assert_eq!(header.number, 1);
        assert_eq!(header.gas_limit, 5000);
        assert_eq!(header.timestamp, 1_438_269_988);
        assert_eq!(header.difficulty, U256::from(17_171_480_576u64));
        assert_eq!(header.nonce_value(), 0x539b_d497_9fef_1ec4);
        assert_eq!(
            header.coinbase,
            "0x05a56e2d52c817161883f50c441c3228cfe54d9f".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn pending_block_without_seal_is_a_decode_error() {
        let mut json = mainnet_block_one();
        json["mixHash"] = serde_json::Value::Null;
        let block: ethers::types::Block<ethers::types::Transaction> =
            serde_json::from_value(json).unwrap();
        assert!(matches!(convert_header(&block), Err(ChainError::Decode(_))));
    }

    fn receipt_json(tx_type: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "transactionIndex": "0x2",
            "blockHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "blockNumber": "0x10",
            "from": "0x00000000000000000000000000000000000000c1",
            "to": "0x00000000000000000000000000000000000000aa",
            "cumulativeGasUsed": "0xa410",
            "gasUsed": "0x5208",
            "contractAddress": null,
            "logs": [{
                "address": "0x00000000000000000000000000000000000000aa",
                "topics": ["0x3333333333333333333333333333333333333333333333333333333333333333"],
                "data": "0x01"
            }],
            "status": "0x1",
            "logsBloom": "0x00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000",
            "type": tx_type
        })
    }

    #[test]
    fn typed_receipt_keeps_its_type_byte() {
        let raw: ethers::types::TransactionReceipt =
            serde_json::from_value(receipt_json(Some("0x2"))).unwrap();
        let receipt = convert_receipt(raw).unwrap();

        assert_eq!(receipt.tx_type, 2);
        assert_eq!(receipt.transaction_index, 2);
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.cumulative_gas_used, 0xa410);
        assert_eq!(receipt.outcome, ReceiptOutcome::Status(true));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].topics, vec![B256::repeat_byte(0x33)]);
        assert_eq!(receipt.encode_consensus()[0], 2);
    }

    #[test]
    fn pre_byzantium_receipt_uses_post_state() {
        let mut json = receipt_json(None);
        json["status"] = serde_json::Value::Null;
        json["root"] = serde_json::json!(
            "0x4444444444444444444444444444444444444444444444444444444444444444"
        );
        let receipt = convert_receipt(serde_json::from_value(json).unwrap()).unwrap();

        assert_eq!(receipt.tx_type, 0);
        assert_eq!(
            receipt.outcome,
            ReceiptOutcome::PostState(B256::repeat_byte(0x44))
        );
        // Legacy receipts are a bare RLP list.
        assert!(receipt.encode_consensus()[0] >= 0xc0);
    }
}

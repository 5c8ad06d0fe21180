use crate::{
    chain::{
        evm::{CreateQuestArgs, EvmRpc, SignedTx, TxReceipt},
        RpcError,
    },
    config::ChainConfig,
    error::{Error, Result},
    utils::{classify_web3_error, extract_keypair_from_str, handle_error, is_already_known},
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{info, warn};
use reqwest::{Client, Url};
use std::time::Duration;
use web3::{
    self,
    contract::{tokens::Tokenize, Contract, Options},
    ethabi::{self, Token},
    futures::lock::Mutex,
    signing::SecretKey,
    transports::Http,
    types::{
        Address, BlockId, BlockNumber, Bytes, TransactionId, TransactionParameters, H256, U256, U64,
    },
    Web3,
};

lazy_static! {
    /// Serializes nonce lookup and signing for the local key.
    pub static ref SIGNER_LOCK: Mutex<()> = Mutex::new(());
}

pub const DEFAULT_GAS_LIMIT: u64 = 500_000;
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const ERC20_ABI: &str = r#"[
  {"type":"function","name":"allowance","stateMutability":"view",
   "inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],
   "outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"approve","stateMutability":"nonpayable",
   "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
   "outputs":[{"name":"","type":"bool"}]}
]"#;

pub const QUEST_FACTORY_ABI: &str = r#"[
  {"type":"function","name":"createQuest","stateMutability":"nonpayable",
   "inputs":[{"name":"campaignId","type":"string"},{"name":"token","type":"address"},
             {"name":"amount","type":"uint256"},{"name":"deadline","type":"uint256"},
             {"name":"maxWinners","type":"uint256"}],
   "outputs":[]}
]"#;

impl Tokenize for CreateQuestArgs {
    fn into_tokens(self) -> Vec<Token> {
        vec![
            Token::String(self.campaign_id),
            Token::Address(self.token),
            Token::Uint(self.amount),
            Token::Uint(self.deadline),
            Token::Uint(self.max_winners),
        ]
    }
}

fn encode_call(
    abi: &str,
    func: &str,
    params: impl Tokenize,
) -> std::result::Result<Vec<u8>, RpcError> {
    ethabi::Contract::load(abi.as_bytes())
        .and_then(|c| c.function(func)?.encode_input(&params.into_tokens()))
        .map_err(|e| RpcError::Failed(format!("Abi error: {}", e)))
}

/// calldata of `QuestFactory.createQuest`
pub fn encode_create_quest(args: CreateQuestArgs) -> std::result::Result<Vec<u8>, RpcError> {
    encode_call(QUEST_FACTORY_ABI, "createQuest", args)
}

/// calldata of `ERC20.approve`
pub fn encode_approve(spender: Address, amount: U256) -> std::result::Result<Vec<u8>, RpcError> {
    encode_call(ERC20_ABI, "approve", (spender, amount))
}

/// [`EvmRpc`] over a JSON-RPC node, signing locally with the configured key.
#[derive(Debug)]
pub struct Web3Rpc {
    web3: Web3<Http>,
    key: Option<SecretKey>,
    signer: Option<Address>,
    chain_id: Option<u64>,
    gas_limit: u64,
    confirmation: Duration,
}

impl Web3Rpc {
    pub fn connect(
        config: &ChainConfig,
        request_timeout: Duration,
        confirmation: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let url = Url::parse(config.endpoint.as_str())
            .map_err(|e| Error::Config(format!("bad endpoint {}: {}", config.endpoint, e)))?;
        let transport = Http::with_client(client, url);

        let (key, signer) = match config.secret.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(secret) => {
                let (sk, addr) = extract_keypair_from_str(secret)?;
                (Some(sk), Some(addr))
            }
            None => (None, None),
        };

        Ok(Self {
            web3: Web3::new(transport),
            key,
            signer,
            chain_id: config.chain_id,
            gas_limit: config.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            confirmation,
        })
    }

    fn signing_key(&self) -> std::result::Result<(&SecretKey, Address), RpcError> {
        match (self.key.as_ref(), self.signer) {
            (Some(key), Some(signer)) => Ok((key, signer)),
            _ => Err(RpcError::Failed("no signer configured".to_string())),
        }
    }
}

#[async_trait]
impl EvmRpc for Web3Rpc {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> std::result::Result<u64, RpcError> {
        self.web3
            .eth()
            .chain_id()
            .await
            .map(|id| id.low_u64())
            .map_err(|e| classify_web3_error(&e))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> std::result::Result<U256, RpcError> {
        let contract = Contract::from_json(self.web3.eth(), token, ERC20_ABI.as_bytes())
            .map_err(|e| RpcError::Failed(format!("Abi error: {}", e)))?;
        contract
            .query("allowance", (owner, spender), owner, Options::default(), None::<BlockId>)
            .await
            .map_err(|e| RpcError::Failed(handle_error(e)))
    }

    async fn sign_call(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> std::result::Result<SignedTx, RpcError> {
        let (key, signer) = self.signing_key()?;
        let _guard = SIGNER_LOCK.lock().await;
        let nonce = self
            .web3
            .eth()
            .transaction_count(signer, Some(BlockNumber::Pending))
            .await
            .map_err(|e| classify_web3_error(&e))?;
        let tx = TransactionParameters {
            nonce: Some(nonce),
            to: Some(to),
            gas: self.gas_limit.into(),
            data: Bytes(data),
            chain_id: self.chain_id,
            ..Default::default()
        };
        let signed = self
            .web3
            .accounts()
            .sign_transaction(tx, key)
            .await
            .map_err(|e| classify_web3_error(&e))?;

        Ok(SignedTx {
            hash: signed.transaction_hash,
            raw: signed.raw_transaction.0,
            nonce: nonce.low_u64(),
        })
    }

    async fn send_raw(&self, raw: Vec<u8>) -> std::result::Result<(), RpcError> {
        match self.web3.eth().send_raw_transaction(Bytes(raw)).await {
            Ok(hash) => {
                info!("broadcast {:?}", hash);
                Ok(())
            }
            Err(e) => match classify_web3_error(&e) {
                RpcError::Failed(msg) if is_already_known(&msg) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn wait_receipt(&self, hash: H256) -> std::result::Result<TxReceipt, RpcError> {
        let poll = async {
            loop {
                match self.receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => warn!("receipt of {:?} unavailable: {}", hash, e),
                }
                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(self.confirmation, poll).await {
            Ok(receipt) => {
                info!("{:?} mined, success {}", receipt.hash, receipt.success);
                Ok(receipt)
            }
            Err(_) => Err(RpcError::Failed(format!(
                "{:?} not confirmed within {}s",
                hash,
                self.confirmation.as_secs()
            ))),
        }
    }

    async fn receipt(&self, hash: H256) -> std::result::Result<Option<TxReceipt>, RpcError> {
        let receipt = self
            .web3
            .eth()
            .transaction_receipt(hash)
            .await
            .map_err(|e| classify_web3_error(&e))?;
        Ok(receipt.map(|r| TxReceipt {
            hash: r.transaction_hash,
            success: r.status == Some(U64::from(1)),
        }))
    }

    async fn is_known(&self, hash: H256) -> std::result::Result<bool, RpcError> {
        self.web3
            .eth()
            .transaction(TransactionId::Hash(hash))
            .await
            .map(|tx| tx.is_some())
            .map_err(|e| classify_web3_error(&e))
    }

    async fn mined_nonce(&self) -> std::result::Result<u64, RpcError> {
        let (_, signer) = self.signing_key()?;
        self.web3
            .eth()
            .transaction_count(signer, Some(BlockNumber::Latest))
            .await
            .map(|n| n.low_u64())
            .map_err(|e| classify_web3_error(&e))
    }
}

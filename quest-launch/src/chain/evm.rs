use super::{
    AdapterError, ChainAdapter, CreateParams, CreateReceipt, RpcError, SignedCreate, Submission,
};
use crate::{
    amount::TokenAmount,
    campaign::{Chain, ChainFamily},
    config::ChainConfig,
    contract::{encode_approve, encode_create_quest},
    error::{Error, Result},
};
use async_trait::async_trait;
use log::{info, warn};
use std::str::FromStr;
use web3::types::{Address, H256, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: H256,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: H256,
    pub raw: Vec<u8>,
    pub nonce: u64,
}

/// Arguments of `QuestFactory.createQuest`, already in token units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateQuestArgs {
    pub campaign_id: String,
    pub token: Address,
    pub amount: U256,
    pub deadline: U256,
    pub max_winners: U256,
}

/// Node and signer access needed by [`EvmAdapter`].
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// address of the configured signer, if any
    fn signer(&self) -> Option<Address>;

    async fn chain_id(&self) -> std::result::Result<u64, RpcError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> std::result::Result<U256, RpcError>;

    /// Signs a call of `data` on `to` with the signer's next nonce. Nothing
    /// is broadcast.
    async fn sign_call(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> std::result::Result<SignedTx, RpcError>;

    /// Broadcasts a signed transaction; one the node already holds is accepted.
    async fn send_raw(&self, raw: Vec<u8>) -> std::result::Result<(), RpcError>;

    /// Polls until `hash` is mined or the confirmation timeout runs out.
    async fn wait_receipt(&self, hash: H256) -> std::result::Result<TxReceipt, RpcError>;

    async fn receipt(&self, hash: H256) -> std::result::Result<Option<TxReceipt>, RpcError>;

    /// whether the node knows `hash`, pending or mined
    async fn is_known(&self, hash: H256) -> std::result::Result<bool, RpcError>;

    /// number of transactions of the signer already mined
    async fn mined_nonce(&self) -> std::result::Result<u64, RpcError>;
}

pub struct EvmAdapter<R> {
    rpc: R,
    chain: Chain,
    chain_id: u64,
    factory: Address,
    decimals: u32,
}

impl<R: EvmRpc> EvmAdapter<R> {
    pub fn new(rpc: R, config: &ChainConfig) -> Result<Self> {
        let factory = config.contract.parse::<Address>().map_err(|e| {
            Error::Config(format!("bad quest factory address {}: {}", config.contract, e))
        })?;
        let chain_id = config
            .chain_id
            .ok_or_else(|| Error::Config(format!("chain {} needs a chainId", config.chain)))?;
        Ok(Self {
            rpc,
            chain: config.chain,
            chain_id,
            factory,
            decimals: config.decimals(),
        })
    }

    fn units(&self, amount: TokenAmount) -> Option<U256> {
        amount.to_base_units(self.decimals).map(U256::from)
    }

    fn create_args(
        &self,
        params: &CreateParams,
    ) -> std::result::Result<CreateQuestArgs, AdapterError> {
        let token = params
            .token
            .parse::<Address>()
            .map_err(|e| AdapterError::SubmissionFailed(format!("bad token address: {}", e)))?;
        let amount = self.units(params.amount).filter(|a| !a.is_zero()).ok_or_else(|| {
            AdapterError::SubmissionFailed(format!(
                "amount {} is not representable with {} decimals",
                params.amount, self.decimals
            ))
        })?;
        let deadline = params.deadline.timestamp();
        if deadline <= 0 {
            return Err(AdapterError::SubmissionFailed(format!("bad deadline {}", params.deadline)));
        }
        Ok(CreateQuestArgs {
            campaign_id: params.campaign_id.clone(),
            token,
            amount,
            deadline: U256::from(deadline as u64),
            max_winners: U256::from(params.max_winners),
        })
    }
}

fn parse_hash(tx_hash: &str) -> std::result::Result<H256, AdapterError> {
    H256::from_str(tx_hash).map_err(|e| {
        AdapterError::SubmissionFailed(format!("bad transaction hash {}: {}", tx_hash, e))
    })
}

fn submission_error(e: RpcError) -> AdapterError {
    match e {
        RpcError::Rejected(msg) => AdapterError::SubmissionRejected(msg),
        RpcError::Failed(msg) => AdapterError::SubmissionFailed(msg),
    }
}

#[async_trait]
impl<R: EvmRpc> ChainAdapter for EvmAdapter<R> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn ensure_wallet_ready(&self) -> std::result::Result<(), AdapterError> {
        if self.rpc.signer().is_none() {
            return Err(AdapterError::WalletNotConnected(format!(
                "no EVM signer configured for {}",
                self.chain
            )));
        }
        match self.rpc.chain_id().await {
            Ok(id) if id == self.chain_id => Ok(()),
            Ok(id) => Err(AdapterError::WalletNotConnected(format!(
                "wallet is on chain {}, {} requires {}",
                id, self.chain, self.chain_id
            ))),
            Err(e) => Err(AdapterError::WalletNotConnected(format!(
                "{} network unreachable: {}",
                self.chain, e
            ))),
        }
    }

    async fn check_allowance(&self, token: &str, amount: TokenAmount) -> bool {
        let (Ok(token), Some(owner), Some(required)) =
            (token.parse::<Address>(), self.rpc.signer(), self.units(amount))
        else {
            return false;
        };
        match self.rpc.allowance(token, owner, self.factory).await {
            Ok(current) => {
                info!(
                    "{} allowance of {:?} for factory: {} (need {})",
                    self.chain, owner, current, required
                );
                current >= required
            }
            Err(e) => {
                warn!("{} allowance check failed, assuming insufficient: {}", self.chain, e);
                false
            }
        }
    }

    // Approving twice only sets the same allowance again, so approval is not
    // journaled like the funding transaction.
    async fn approve(
        &self,
        token: &str,
        amount: TokenAmount,
    ) -> std::result::Result<(), AdapterError> {
        let token = token
            .parse::<Address>()
            .map_err(|e| AdapterError::ApprovalFailed(format!("bad token address: {}", e)))?;
        let required = self.units(amount).ok_or_else(|| {
            AdapterError::ApprovalFailed(format!("amount {} out of range", amount))
        })?;
        let approval_error = |e: RpcError| match e {
            RpcError::Rejected(msg) => AdapterError::ApprovalRejected(msg),
            RpcError::Failed(msg) => AdapterError::ApprovalFailed(msg),
        };

        let data = encode_approve(self.factory, required).map_err(approval_error)?;
        let signed = self.rpc.sign_call(token, data).await.map_err(approval_error)?;
        self.rpc.send_raw(signed.raw).await.map_err(approval_error)?;
        match self.rpc.wait_receipt(signed.hash).await.map_err(approval_error)? {
            receipt if receipt.success => {
                info!("{} approval confirmed in {:?}", self.chain, receipt.hash);
                Ok(())
            }
            receipt => Err(AdapterError::ApprovalFailed(format!(
                "approval transaction {:?} reverted",
                receipt.hash
            ))),
        }
    }

    async fn sign_create(
        &self,
        params: &CreateParams,
    ) -> std::result::Result<SignedCreate, AdapterError> {
        let data = encode_create_quest(self.create_args(params)?).map_err(submission_error)?;
        let signed = self.rpc.sign_call(self.factory, data).await.map_err(submission_error)?;
        info!(
            "{} createQuest for {} signed as {:?}, nonce {}",
            self.chain, params.campaign_id, signed.hash, signed.nonce
        );
        Ok(SignedCreate {
            tx_hash: format!("{:?}", signed.hash),
            raw: hex::encode(&signed.raw),
            nonce: Some(signed.nonce),
        })
    }

    async fn broadcast_create(
        &self,
        signed: &SignedCreate,
    ) -> std::result::Result<(), AdapterError> {
        let raw = hex::decode(&signed.raw).map_err(|e| {
            let message = format!("corrupt signed transaction {}: {}", signed.tx_hash, e);
            AdapterError::SubmissionFailed(message)
        })?;
        self.rpc.send_raw(raw).await.map_err(submission_error)
    }

    async fn confirm_create(
        &self,
        _params: &CreateParams,
        tx_hash: &str,
    ) -> std::result::Result<CreateReceipt, AdapterError> {
        let hash = parse_hash(tx_hash)?;
        match self.rpc.wait_receipt(hash).await {
            Ok(receipt) if receipt.success => Ok(CreateReceipt {
                tx_hash: tx_hash.to_string(),
                on_chain_address: None,
            }),
            Ok(_) => Err(AdapterError::SubmissionFailed(format!(
                "createQuest transaction {} reverted",
                tx_hash
            ))),
            Err(e) => Err(AdapterError::SubmissionFailed(format!(
                "{}, transaction {} may still confirm",
                e, tx_hash
            ))),
        }
    }

    async fn find_create(
        &self,
        _params: &CreateParams,
        earlier: Option<&SignedCreate>,
    ) -> std::result::Result<Submission, AdapterError> {
        let Some(earlier) = earlier else {
            return Ok(Submission::Absent);
        };
        let hash = parse_hash(&earlier.tx_hash)?;
        let lookup = |e: RpcError| {
            AdapterError::SubmissionFailed(format!("cannot look up {}: {}", earlier.tx_hash, e))
        };

        // read before the receipt: a transaction mined in between then shows
        // up as a receipt instead of as a consumed nonce
        let mined = self.rpc.mined_nonce().await.map_err(lookup)?;
        match self.rpc.receipt(hash).await.map_err(lookup)? {
            Some(receipt) if receipt.success => {
                return Ok(Submission::Landed(CreateReceipt {
                    tx_hash: earlier.tx_hash.clone(),
                    on_chain_address: None,
                }))
            }
            Some(_) => {
                warn!("{} earlier createQuest {} reverted", self.chain, earlier.tx_hash);
                return Ok(Submission::Absent);
            }
            None => {}
        }
        if self.rpc.is_known(hash).await.map_err(lookup)? {
            return Ok(Submission::Pending);
        }
        // unknown to the node: it can still land unless its nonce went to
        // another transaction in the meantime
        match earlier.nonce {
            Some(nonce) if nonce < mined => Ok(Submission::Absent),
            _ => Ok(Submission::Unsent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::{collections::HashMap, sync::Mutex};

    const TOKEN: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

    #[derive(Default)]
    struct FakeRpc {
        signer: Option<Address>,
        chain_id: u64,
        allowance: Option<U256>,
        reject: bool,
        revert: bool,
        mined_nonce: u64,
        signed: Mutex<Vec<(Address, Vec<u8>)>>,
        sent: Mutex<Vec<Vec<u8>>>,
        mempool: Mutex<Vec<H256>>,
        receipts: Mutex<HashMap<H256, bool>>,
    }

    #[async_trait]
    impl EvmRpc for FakeRpc {
        fn signer(&self) -> Option<Address> {
            self.signer
        }

        async fn chain_id(&self) -> std::result::Result<u64, RpcError> {
            Ok(self.chain_id)
        }

        async fn allowance(
            &self,
            _: Address,
            _: Address,
            _: Address,
        ) -> std::result::Result<U256, RpcError> {
            self.allowance.ok_or_else(|| RpcError::Failed("timeout".into()))
        }

        async fn sign_call(
            &self,
            to: Address,
            data: Vec<u8>,
        ) -> std::result::Result<SignedTx, RpcError> {
            if self.reject {
                return Err(RpcError::Rejected("User denied transaction signature".into()));
            }
            let mut signed = self.signed.lock().unwrap();
            signed.push((to, data.clone()));
            Ok(SignedTx {
                hash: H256::repeat_byte(signed.len() as u8),
                raw: data,
                nonce: self.mined_nonce,
            })
        }

        async fn send_raw(&self, raw: Vec<u8>) -> std::result::Result<(), RpcError> {
            let n = self.sent.lock().unwrap().len();
            self.sent.lock().unwrap().push(raw);
            self.mempool.lock().unwrap().push(H256::repeat_byte(n as u8 + 1));
            Ok(())
        }

        async fn wait_receipt(&self, hash: H256) -> std::result::Result<TxReceipt, RpcError> {
            match self.receipts.lock().unwrap().get(&hash) {
                Some(success) => Ok(TxReceipt { hash, success: *success }),
                None if self.revert => Ok(TxReceipt { hash, success: false }),
                None => Err(RpcError::Failed(format!("{:?} not confirmed within 600s", hash))),
            }
        }

        async fn receipt(&self, hash: H256) -> std::result::Result<Option<TxReceipt>, RpcError> {
            Ok(self
                .receipts
                .lock()
                .unwrap()
                .get(&hash)
                .map(|success| TxReceipt { hash, success: *success }))
        }

        async fn is_known(&self, hash: H256) -> std::result::Result<bool, RpcError> {
            Ok(self.mempool.lock().unwrap().contains(&hash))
        }

        async fn mined_nonce(&self) -> std::result::Result<u64, RpcError> {
            Ok(self.mined_nonce)
        }
    }

    fn config() -> ChainConfig {
        ChainConfig {
            chain: Chain::Base,
            endpoint: "http://localhost:8545".into(),
            contract: "0x00000000000000000000000000000000000000aa".into(),
            chain_id: Some(8453),
            token_decimals: None,
            secret: None,
            wallet_bridge: None,
            gas_limit: None,
        }
    }

    fn adapter(rpc: FakeRpc) -> EvmAdapter<FakeRpc> {
        EvmAdapter::new(rpc, &config()).unwrap()
    }

    fn signer() -> Option<Address> {
        Some(Address::repeat_byte(7))
    }

    fn params(amount: &str) -> CreateParams {
        CreateParams {
            campaign_id: "c-1".into(),
            token: TOKEN.into(),
            amount: amount.parse().unwrap(),
            deadline: Utc::now() + Duration::days(3),
            max_winners: 10,
        }
    }

    #[tokio::test]
    async fn wallet_must_be_on_expected_chain() {
        let a = adapter(FakeRpc { signer: signer(), chain_id: 1, ..Default::default() });
        assert!(matches!(a.ensure_wallet_ready().await, Err(AdapterError::WalletNotConnected(_))));

        let a = adapter(FakeRpc { signer: None, chain_id: 8453, ..Default::default() });
        assert!(matches!(a.ensure_wallet_ready().await, Err(AdapterError::WalletNotConnected(_))));

        let a = adapter(FakeRpc { signer: signer(), chain_id: 8453, ..Default::default() });
        assert_eq!(a.ensure_wallet_ready().await, Ok(()));
    }

    #[tokio::test]
    async fn allowance_compares_six_decimal_units() {
        let amount: TokenAmount = "100".parse().unwrap();
        let a = adapter(FakeRpc {
            signer: signer(),
            allowance: Some(U256::from(100_000_000u64)),
            ..Default::default()
        });
        assert!(a.check_allowance(TOKEN, amount).await);

        let a = adapter(FakeRpc {
            signer: signer(),
            allowance: Some(U256::from(99_999_999u64)),
            ..Default::default()
        });
        assert!(!a.check_allowance(TOKEN, amount).await);
    }

    #[tokio::test]
    async fn allowance_rpc_error_is_insufficient() {
        let a = adapter(FakeRpc { signer: signer(), allowance: None, ..Default::default() });
        assert!(!a.check_allowance(TOKEN, "1".parse().unwrap()).await);
        assert!(!a.check_allowance("not-an-address", "1".parse().unwrap()).await);
    }

    #[tokio::test]
    async fn approve_maps_rejection_and_revert() {
        let amount: TokenAmount = "1".parse().unwrap();
        let a = adapter(FakeRpc { signer: signer(), reject: true, ..Default::default() });
        assert!(matches!(a.approve(TOKEN, amount).await, Err(AdapterError::ApprovalRejected(_))));

        let a = adapter(FakeRpc { signer: signer(), revert: true, ..Default::default() });
        assert!(matches!(a.approve(TOKEN, amount).await, Err(AdapterError::ApprovalFailed(_))));
    }

    #[tokio::test]
    async fn sign_encodes_factory_call_without_sending() {
        let a = adapter(FakeRpc { signer: signer(), mined_nonce: 4, ..Default::default() });
        let p = params("100.00");
        let signed = a.sign_create(&p).await.unwrap();

        assert_eq!(signed.tx_hash, format!("{:?}", H256::repeat_byte(1)));
        assert_eq!(signed.nonce, Some(4));
        assert!(a.rpc.sent.lock().unwrap().is_empty());

        let calls = a.rpc.signed.lock().unwrap();
        assert_eq!(calls[0].0, a.factory);
        let args = a.create_args(&p).unwrap();
        assert_eq!(args.amount, U256::from(100_000_000u64));
        assert_eq!(args.deadline, U256::from(p.deadline.timestamp() as u64));
        assert_eq!(calls[0].1, encode_create_quest(args).unwrap());
        assert_eq!(hex::decode(&signed.raw).unwrap(), calls[0].1);
    }

    #[tokio::test]
    async fn sign_rejects_dust() {
        let a = adapter(FakeRpc { signer: signer(), ..Default::default() });
        let err = a.sign_create(&params("0.0000001")).await.unwrap_err();
        assert!(matches!(err, AdapterError::SubmissionFailed(_)));
        assert!(a.rpc.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_timeout_keeps_hash_in_error() {
        let a = adapter(FakeRpc { signer: signer(), ..Default::default() });
        let p = params("1");
        let signed = a.sign_create(&p).await.unwrap();
        a.broadcast_create(&signed).await.unwrap();

        let err = a.confirm_create(&p, &signed.tx_hash).await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::SubmissionFailed(ref m) if m.contains(&signed.tx_hash)
        ));
        assert_eq!(a.find_create(&p, Some(&signed)).await.unwrap(), Submission::Pending);

        a.rpc.receipts.lock().unwrap().insert(H256::repeat_byte(1), true);
        assert_eq!(
            a.find_create(&p, Some(&signed)).await.unwrap(),
            Submission::Landed(CreateReceipt {
                tx_hash: signed.tx_hash.clone(),
                on_chain_address: None,
            })
        );
    }

    #[tokio::test]
    async fn find_classifies_unbroadcast_transactions() {
        let a = adapter(FakeRpc { signer: signer(), mined_nonce: 4, ..Default::default() });
        let p = params("1");
        assert_eq!(a.find_create(&p, None).await.unwrap(), Submission::Absent);

        let signed = a.sign_create(&p).await.unwrap();
        assert_eq!(a.find_create(&p, Some(&signed)).await.unwrap(), Submission::Unsent);

        let stale = SignedCreate { nonce: Some(3), ..signed.clone() };
        assert_eq!(a.find_create(&p, Some(&stale)).await.unwrap(), Submission::Absent);

        a.rpc.receipts.lock().unwrap().insert(H256::repeat_byte(1), false);
        assert_eq!(a.find_create(&p, Some(&signed)).await.unwrap(), Submission::Absent);

        // its own nonce is below the mined count once it lands
        a.rpc.receipts.lock().unwrap().insert(H256::repeat_byte(1), true);
        match a.find_create(&p, Some(&stale)).await.unwrap() {
            Submission::Landed(receipt) => assert_eq!(receipt.tx_hash, signed.tx_hash),
            other => panic!("unexpected {:?}", other),
        }
    }
}

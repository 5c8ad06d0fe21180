use super::{
    AdapterError, ChainAdapter, CreateParams, CreateReceipt, RpcError, SignedCreate, Submission,
};
use crate::{
    amount::TokenAmount,
    campaign::{Chain, ChainFamily},
    config::{ChainConfig, DEFAULT_CONFIRMATION_TIMEOUT},
    error::{Error, Result},
    utils::{is_already_known, is_user_rejection},
};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use solana_program::{
    hash::hash,
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program,
};
use std::{str::FromStr, time::Duration};

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

const CAMPAIGN_SEED: &[u8] = b"campaign";
const VAULT_SEED: &[u8] = b"vault";

pub const SIGNATURE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// the cluster has no record of the signature
    Unknown,
    Processed,
    /// confirmed or finalized
    Confirmed,
    Failed(String),
}

/// Wallet session plus read access to the cluster it is attached to.
#[async_trait]
pub trait SolanaWallet: Send + Sync {
    async fn connected_key(&self) -> Option<Pubkey>;

    /// Has the wallet sign a transaction of `instructions` without sending it.
    async fn sign(
        &self,
        instructions: Vec<Instruction>,
    ) -> std::result::Result<SignedCreate, RpcError>;

    async fn send(&self, signed: &SignedCreate) -> std::result::Result<(), RpcError>;

    async fn signature_status(
        &self,
        signature: &str,
    ) -> std::result::Result<SignatureStatus, RpcError>;

    async fn account_exists(&self, address: &Pubkey) -> std::result::Result<bool, RpcError>;
}

/// 32-byte seed of a campaign's PDA.
pub fn campaign_seed(campaign_id: &str) -> [u8; 32] {
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&Keccak256::digest(campaign_id.as_bytes()));
    seed
}

pub fn campaign_address(program_id: &Pubkey, campaign_id: &str) -> Pubkey {
    Pubkey::find_program_address(&[CAMPAIGN_SEED, &campaign_seed(campaign_id)], program_id).0
}

pub fn vault_address(program_id: &Pubkey, campaign: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[VAULT_SEED, campaign.as_ref()], program_id).0
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

fn sighash(name: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash(format!("global:{}", name).as_bytes()).to_bytes()[..8]);
    out
}

/// `create_campaign(seed: [u8; 32], amount: u64, deadline: i64, max_winners: u32)`
pub fn create_campaign_instruction(
    program_id: &Pubkey,
    creator: &Pubkey,
    mint: &Pubkey,
    campaign_id: &str,
    amount: u64,
    deadline: i64,
    max_winners: u32,
) -> Instruction {
    let campaign = campaign_address(program_id, campaign_id);
    let vault = vault_address(program_id, &campaign);
    let creator_tokens = associated_token_address(creator, mint);

    let mut data = Vec::with_capacity(8 + 32 + 8 + 8 + 4);
    data.extend_from_slice(&sighash("create_campaign"));
    data.extend_from_slice(&campaign_seed(campaign_id));
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&deadline.to_le_bytes());
    data.extend_from_slice(&max_winners.to_le_bytes());

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*creator, true),
            AccountMeta::new(campaign, false),
            AccountMeta::new(vault, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(creator_tokens, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

pub struct SolanaAdapter<W> {
    wallet: W,
    chain: Chain,
    program_id: Pubkey,
    decimals: u32,
    confirmation: Duration,
}

impl<W: SolanaWallet> SolanaAdapter<W> {
    pub fn new(wallet: W, config: &ChainConfig) -> Result<Self> {
        let program_id = Pubkey::from_str(&config.contract)
            .map_err(|e| Error::Config(format!("bad program id {}: {}", config.contract, e)))?;
        Ok(Self {
            wallet,
            chain: config.chain,
            program_id,
            decimals: config.decimals(),
            confirmation: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT),
        })
    }

    pub fn with_confirmation(mut self, confirmation: Duration) -> Self {
        self.confirmation = confirmation;
        self
    }

    fn receipt(&self, params: &CreateParams, signature: &str) -> CreateReceipt {
        CreateReceipt {
            tx_hash: signature.to_string(),
            on_chain_address: Some(
                campaign_address(&self.program_id, &params.campaign_id).to_string(),
            ),
        }
    }
}

fn submission_error(e: RpcError) -> AdapterError {
    match e {
        RpcError::Rejected(msg) => AdapterError::SubmissionRejected(msg),
        RpcError::Failed(msg) => AdapterError::SubmissionFailed(msg),
    }
}

#[async_trait]
impl<W: SolanaWallet> ChainAdapter for SolanaAdapter<W> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn ensure_wallet_ready(&self) -> std::result::Result<(), AdapterError> {
        match self.wallet.connected_key().await {
            Some(_) => Ok(()),
            None => Err(AdapterError::WalletNotConnected(format!(
                "no Solana wallet connected for {}",
                self.chain
            ))),
        }
    }

    // Campaign funding moves tokens inside the create instruction, there is
    // no separate allowance to grant.
    async fn check_allowance(&self, _token: &str, _amount: TokenAmount) -> bool {
        true
    }

    async fn approve(
        &self,
        _token: &str,
        _amount: TokenAmount,
    ) -> std::result::Result<(), AdapterError> {
        Ok(())
    }

    async fn sign_create(
        &self,
        params: &CreateParams,
    ) -> std::result::Result<SignedCreate, AdapterError> {
        let creator = self.wallet.connected_key().await.ok_or_else(|| {
            let message = format!("no Solana wallet connected for {}", self.chain);
            AdapterError::WalletNotConnected(message)
        })?;
        let mint = Pubkey::from_str(&params.token).map_err(|e| {
            AdapterError::SubmissionFailed(format!("bad mint {}: {}", params.token, e))
        })?;
        let amount = params
            .amount
            .to_base_units(self.decimals)
            .and_then(|raw| u64::try_from(raw).ok())
            .filter(|raw| *raw > 0)
            .ok_or_else(|| {
                AdapterError::SubmissionFailed(format!(
                    "amount {} is not representable with {} decimals",
                    params.amount, self.decimals
                ))
            })?;

        let ix = create_campaign_instruction(
            &self.program_id,
            &creator,
            &mint,
            &params.campaign_id,
            amount,
            params.deadline.timestamp(),
            params.max_winners,
        );
        let signed = self.wallet.sign(vec![ix]).await.map_err(submission_error)?;
        info!(
            "{} create_campaign for {} signed as {}",
            self.chain, params.campaign_id, signed.tx_hash
        );
        Ok(signed)
    }

    async fn broadcast_create(
        &self,
        signed: &SignedCreate,
    ) -> std::result::Result<(), AdapterError> {
        self.wallet.send(signed).await.map_err(submission_error)
    }

    async fn confirm_create(
        &self,
        params: &CreateParams,
        tx_hash: &str,
    ) -> std::result::Result<CreateReceipt, AdapterError> {
        let poll = async {
            loop {
                match self.wallet.signature_status(tx_hash).await {
                    Ok(SignatureStatus::Confirmed) => return Ok(()),
                    Ok(SignatureStatus::Failed(err)) => return Err(err),
                    Ok(_) => {}
                    Err(e) => warn!("status of {} unavailable: {}", tx_hash, e),
                }
                tokio::time::sleep(SIGNATURE_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(self.confirmation, poll).await {
            Ok(Ok(())) => {
                let receipt = self.receipt(params, tx_hash);
                info!(
                    "{} campaign {:?} created in {}",
                    self.chain, receipt.on_chain_address, tx_hash
                );
                Ok(receipt)
            }
            Ok(Err(err)) => Err(AdapterError::SubmissionFailed(format!(
                "create_campaign {} failed: {}",
                tx_hash, err
            ))),
            Err(_) => Err(AdapterError::SubmissionFailed(format!(
                "{} not confirmed within {}s, it may still confirm",
                tx_hash,
                self.confirmation.as_secs()
            ))),
        }
    }

    // The campaign account can only be initialized once, so once the earlier
    // signature is gone or failed a fresh transaction cannot fund twice.
    async fn find_create(
        &self,
        params: &CreateParams,
        earlier: Option<&SignedCreate>,
    ) -> std::result::Result<Submission, AdapterError> {
        let campaign = campaign_address(&self.program_id, &params.campaign_id);
        let lookup = |e: RpcError| {
            AdapterError::SubmissionFailed(format!("cannot look up {}: {}", campaign, e))
        };

        let exists = self.wallet.account_exists(&campaign).await.map_err(lookup)?;
        match (exists, earlier) {
            (true, Some(earlier)) => Ok(Submission::Landed(self.receipt(params, &earlier.tx_hash))),
            (true, None) => Err(AdapterError::SubmissionFailed(format!(
                "campaign account {} exists but no signature was recorded for it",
                campaign
            ))),
            (false, None) => Ok(Submission::Absent),
            (false, Some(earlier)) => {
                let status = self.wallet.signature_status(&earlier.tx_hash).await;
                match status.map_err(lookup)? {
                    SignatureStatus::Processed | SignatureStatus::Confirmed => {
                        Ok(Submission::Pending)
                    }
                    SignatureStatus::Unknown | SignatureStatus::Failed(_) => Ok(Submission::Absent),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeAccount {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeInstruction {
    program_id: String,
    accounts: Vec<BridgeAccount>,
    /// hex encoded
    data: String,
}

impl From<&Instruction> for BridgeInstruction {
    fn from(ix: &Instruction) -> Self {
        Self {
            program_id: ix.program_id.to_string(),
            accounts: ix
                .accounts
                .iter()
                .map(|a| BridgeAccount {
                    pubkey: a.pubkey.to_string(),
                    is_signer: a.is_signer,
                    is_writable: a.is_writable,
                })
                .collect(),
            data: hex::encode(&ix.data),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionReply {
    public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeReply {
    signature: Option<String>,
    /// hex encoded signed transaction
    transaction: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl BridgeReply {
    fn into_error(self, status: reqwest::StatusCode) -> RpcError {
        let message = self.message.unwrap_or_else(|| format!("wallet bridge status {}", status));
        if self.code == Some(4001) || is_user_rejection(&message) {
            RpcError::Rejected(message)
        } else {
            RpcError::Failed(message)
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcReply<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    err: Option<serde_json::Value>,
    confirmation_status: Option<String>,
}

fn signature_status_of(status: Option<RpcSignatureStatus>) -> SignatureStatus {
    match status {
        None => SignatureStatus::Unknown,
        Some(RpcSignatureStatus { err: Some(err), .. }) => SignatureStatus::Failed(err.to_string()),
        Some(RpcSignatureStatus {
            confirmation_status, ..
        }) => match confirmation_status.as_deref() {
            Some("confirmed") | Some("finalized") => SignatureStatus::Confirmed,
            _ => SignatureStatus::Processed,
        },
    }
}

/// Talks to the wallet bridge that holds the creator's Solana session, and
/// reads the cluster through its JSON-RPC endpoint.
///
/// `GET {bridge}/session` returns `{"publicKey": ...}`. `POST {bridge}/sign`
/// takes `{"instructions": [...]}` and answers `{"signature", "transaction"}`
/// without sending. `POST {bridge}/send` broadcasts such a transaction. Errors
/// come back as `{"code", "message"}` with 4001 meaning the user rejected.
#[derive(Debug, Clone)]
pub struct HttpWalletBridge {
    client: reqwest::Client,
    base: String,
    rpc: String,
}

impl HttpWalletBridge {
    pub fn new(base: &str, rpc: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            rpc: rpc.to_string(),
        })
    }

    async fn bridge_call(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> std::result::Result<BridgeReply, RpcError> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Failed(e.to_string()))?;
        let status = resp.status();
        let reply: BridgeReply = resp.json().await.map_err(|e| RpcError::Failed(e.to_string()))?;
        if status.is_success() && reply.code.is_none() {
            Ok(reply)
        } else {
            Err(reply.into_error(status))
        }
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, RpcError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let reply: JsonRpcReply<T> = self
            .client
            .post(&self.rpc)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcError::Failed(e.to_string()))?;
        match reply {
            JsonRpcReply { error: Some(e), .. } => {
                Err(RpcError::Failed(format!("{} ({})", e.message, e.code)))
            }
            JsonRpcReply { result: Some(r), .. } => Ok(r),
            _ => Err(RpcError::Failed(format!("{} returned no result", method))),
        }
    }
}

#[async_trait]
impl SolanaWallet for HttpWalletBridge {
    async fn connected_key(&self) -> Option<Pubkey> {
        let reply = match self.client.get(format!("{}/session", self.base)).send().await {
            Ok(r) if r.status().is_success() => r.json::<SessionReply>().await,
            Ok(r) => {
                warn!("wallet bridge session status {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("wallet bridge unreachable: {}", e);
                return None;
            }
        };
        reply
            .ok()
            .and_then(|r| r.public_key)
            .and_then(|k| Pubkey::from_str(&k).ok())
    }

    async fn sign(
        &self,
        instructions: Vec<Instruction>,
    ) -> std::result::Result<SignedCreate, RpcError> {
        let body = serde_json::json!({
            "instructions": instructions.iter().map(BridgeInstruction::from).collect::<Vec<_>>(),
        });
        match self.bridge_call("sign", body).await? {
            BridgeReply {
                signature: Some(tx_hash),
                transaction: Some(raw),
                ..
            } => Ok(SignedCreate {
                tx_hash,
                raw,
                nonce: None,
            }),
            _ => Err(RpcError::Failed("wallet bridge returned no signed transaction".into())),
        }
    }

    async fn send(&self, signed: &SignedCreate) -> std::result::Result<(), RpcError> {
        let body = serde_json::json!({"transaction": signed.raw});
        match self.bridge_call("send", body).await {
            Err(RpcError::Failed(msg)) if is_already_known(&msg) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn signature_status(
        &self,
        signature: &str,
    ) -> std::result::Result<SignatureStatus, RpcError> {
        let params = serde_json::json!([[signature], {"searchTransactionHistory": true}]);
        let reply: WithContext<Vec<Option<RpcSignatureStatus>>> =
            self.rpc_call("getSignatureStatuses", params).await?;
        Ok(signature_status_of(reply.value.into_iter().next().flatten()))
    }

    async fn account_exists(&self, address: &Pubkey) -> std::result::Result<bool, RpcError> {
        let params = serde_json::json!([address.to_string(), {"encoding": "base64"}]);
        let reply: WithContext<Option<serde_json::Value>> =
            self.rpc_call("getAccountInfo", params).await?;
        Ok(reply.value.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[derive(Default)]
    struct FakeWallet {
        key: Option<Pubkey>,
        reject: bool,
        signed: Mutex<Vec<Instruction>>,
        sent: Mutex<Vec<String>>,
        statuses: Mutex<HashMap<String, SignatureStatus>>,
        accounts: Mutex<Vec<Pubkey>>,
    }

    #[async_trait]
    impl SolanaWallet for FakeWallet {
        async fn connected_key(&self) -> Option<Pubkey> {
            self.key
        }

        async fn sign(
            &self,
            instructions: Vec<Instruction>,
        ) -> std::result::Result<SignedCreate, RpcError> {
            if self.reject {
                return Err(RpcError::Rejected("User rejected the request.".into()));
            }
            let mut signed = self.signed.lock().unwrap();
            signed.extend(instructions);
            Ok(SignedCreate {
                tx_hash: format!("sig{}", signed.len()),
                raw: "00".into(),
                nonce: None,
            })
        }

        async fn send(&self, signed: &SignedCreate) -> std::result::Result<(), RpcError> {
            self.sent.lock().unwrap().push(signed.tx_hash.clone());
            Ok(())
        }

        async fn signature_status(
            &self,
            signature: &str,
        ) -> std::result::Result<SignatureStatus, RpcError> {
            let statuses = self.statuses.lock().unwrap();
            Ok(statuses.get(signature).cloned().unwrap_or(SignatureStatus::Unknown))
        }

        async fn account_exists(&self, address: &Pubkey) -> std::result::Result<bool, RpcError> {
            Ok(self.accounts.lock().unwrap().contains(address))
        }
    }

    fn connected() -> FakeWallet {
        FakeWallet {
            key: Some(Pubkey::new_unique()),
            ..Default::default()
        }
    }

    fn program() -> Pubkey {
        Pubkey::new_unique()
    }

    fn adapter(wallet: FakeWallet, program_id: Pubkey) -> SolanaAdapter<FakeWallet> {
        let config = ChainConfig {
            chain: Chain::SolanaDevnet,
            endpoint: "http://localhost:8899".into(),
            contract: program_id.to_string(),
            chain_id: None,
            token_decimals: None,
            secret: None,
            wallet_bridge: Some("http://bridge".into()),
            gas_limit: None,
        };
        SolanaAdapter::new(wallet, &config)
            .unwrap()
            .with_confirmation(Duration::from_secs(5))
    }

    fn params() -> CreateParams {
        CreateParams {
            campaign_id: "4f9c7f0e-campaign".into(),
            token: MINT.into(),
            amount: "2.5".parse().unwrap(),
            deadline: Utc::now() + ChronoDuration::days(3),
            max_winners: 5,
        }
    }

    fn earlier(sig: &str) -> SignedCreate {
        SignedCreate {
            tx_hash: sig.into(),
            raw: "00".into(),
            nonce: None,
        }
    }

    #[test]
    fn campaign_address_is_deterministic() {
        let program_id = program();
        let a = campaign_address(&program_id, "c-1");
        assert_eq!(a, campaign_address(&program_id, "c-1"));
        assert_ne!(a, campaign_address(&program_id, "c-2"));
        assert!(!a.is_on_curve());
    }

    #[test]
    fn instruction_layout() {
        let program_id = program();
        let creator = Pubkey::new_unique();
        let mint = Pubkey::from_str(MINT).unwrap();
        let ix =
            create_campaign_instruction(&program_id, &creator, &mint, "c-1", 42, 1_900_000_000, 7);

        assert_eq!(ix.data.len(), 60);
        assert_eq!(&ix.data[..8], &sighash("create_campaign"));
        assert_eq!(&ix.data[8..40], &campaign_seed("c-1"));
        assert_eq!(&ix.data[40..48], &42u64.to_le_bytes());
        assert_eq!(&ix.data[48..56], &1_900_000_000i64.to_le_bytes());
        assert_eq!(&ix.data[56..], &7u32.to_le_bytes());
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[1].pubkey, campaign_address(&program_id, "c-1"));
    }

    #[tokio::test]
    async fn sign_scales_to_lamports_without_sending() {
        let a = adapter(connected(), program());
        let signed = a.sign_create(&params()).await.unwrap();

        assert_eq!(signed.tx_hash, "sig1");
        assert!(a.wallet.sent.lock().unwrap().is_empty());
        let ixs = a.wallet.signed.lock().unwrap();
        assert_eq!(&ixs[0].data[40..48], &2_500_000_000u64.to_le_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_reports_campaign_address() {
        let program_id = program();
        let a = adapter(connected(), program_id);
        a.wallet
            .statuses
            .lock()
            .unwrap()
            .insert("sig1".into(), SignatureStatus::Confirmed);

        let receipt = a.confirm_create(&params(), "sig1").await.unwrap();
        assert_eq!(receipt.tx_hash, "sig1");
        assert_eq!(
            receipt.on_chain_address,
            Some(campaign_address(&program_id, "4f9c7f0e-campaign").to_string())
        );

        let timeout = a.confirm_create(&params(), "sig2").await;
        assert!(matches!(
            timeout,
            Err(AdapterError::SubmissionFailed(msg)) if msg.contains("may still confirm")
        ));
    }

    #[tokio::test]
    async fn find_reads_campaign_account_first() {
        let program_id = program();
        let a = adapter(connected(), program_id);
        assert_eq!(a.find_create(&params(), None).await.unwrap(), Submission::Absent);
        let sig1 = earlier("sig1");
        assert_eq!(a.find_create(&params(), Some(&sig1)).await.unwrap(), Submission::Absent);

        a.wallet
            .statuses
            .lock()
            .unwrap()
            .insert("sig1".into(), SignatureStatus::Processed);
        assert_eq!(a.find_create(&params(), Some(&sig1)).await.unwrap(), Submission::Pending);

        a.wallet
            .accounts
            .lock()
            .unwrap()
            .push(campaign_address(&program_id, "4f9c7f0e-campaign"));
        match a.find_create(&params(), Some(&sig1)).await.unwrap() {
            Submission::Landed(receipt) => assert_eq!(receipt.tx_hash, "sig1"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(a.find_create(&params(), None).await.is_err());
    }

    #[tokio::test]
    async fn rejection_and_missing_wallet() {
        let a = adapter(
            FakeWallet {
                key: Some(Pubkey::new_unique()),
                reject: true,
                ..Default::default()
            },
            program(),
        );
        assert!(matches!(a.sign_create(&params()).await, Err(AdapterError::SubmissionRejected(_))));

        let a = adapter(FakeWallet::default(), program());
        assert!(matches!(a.ensure_wallet_ready().await, Err(AdapterError::WalletNotConnected(_))));
        assert!(a.check_allowance(MINT, "1".parse().unwrap()).await);
    }

    #[test]
    fn status_mapping() {
        let parse = |v: serde_json::Value| signature_status_of(serde_json::from_value(v).unwrap());
        assert_eq!(parse(serde_json::Value::Null), SignatureStatus::Unknown);
        assert_eq!(
            parse(serde_json::json!({"err": null, "confirmationStatus": "processed"})),
            SignatureStatus::Processed
        );
        assert_eq!(
            parse(serde_json::json!({"err": null, "confirmationStatus": "finalized"})),
            SignatureStatus::Confirmed
        );
        let failed = serde_json::json!({
            "err": {"InstructionError": [0, "Custom"]},
            "confirmationStatus": "confirmed"
        });
        assert!(matches!(parse(failed), SignatureStatus::Failed(_)));
    }
}

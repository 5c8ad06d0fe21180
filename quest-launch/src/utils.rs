use crate::{
    chain::RpcError,
    error::{Error, Result},
};
use std::str::FromStr;
use web3::{
    contract::Error as ContractError,
    signing::{Key, SecretKey, SecretKeyRef},
    types::Address,
};

/// EIP-1193 "user rejected request"
pub const USER_REJECTED_CODE: i64 = 4001;

#[inline(always)]
pub fn extract_keypair_from_str(sk_str: &str) -> Result<(SecretKey, Address)> {
    let sk_str = sk_str.trim();
    let sk_str = sk_str.strip_prefix("0x").unwrap_or(sk_str);
    let root_sk = SecretKey::from_str(sk_str)
        .map_err(|e| Error::Config(format!("bad secret key: {}", e)))?;
    let root_addr = SecretKeyRef::new(&root_sk).address();
    Ok((root_sk, root_addr))
}

/// Wallets do not agree on a code for "declined", match the usual wording.
pub fn is_user_rejection(message: &str) -> bool {
    let msg = message.to_lowercase();
    ["user rejected", "user denied", "rejected the request", "user declined", "cancelled by user"]
        .iter()
        .any(|p| msg.contains(p))
}

/// Node reply to a broadcast of a transaction it already holds.
pub fn is_already_known(message: &str) -> bool {
    let msg = message.to_lowercase();
    ["already known", "known transaction", "already imported", "already been processed"]
        .iter()
        .any(|p| msg.contains(p))
}

pub fn classify_web3_error(error: &web3::Error) -> RpcError {
    match error {
        web3::Error::Rpc(e)
            if e.code.code() == USER_REJECTED_CODE || is_user_rejection(&e.message) =>
        {
            RpcError::Rejected(e.message.clone())
        }
        web3::Error::Rpc(e) => {
            RpcError::Failed(format!("rpc error {}: {}", e.code.code(), e.message))
        }
        other => RpcError::Failed(other.to_string()),
    }
}

#[inline(always)]
pub fn handle_error(error: ContractError) -> String {
    match error {
        ContractError::InvalidOutputType(s) => format!("Invalid output type: {}", s),
        ContractError::Abi(e) => format!("Abi error: {}", e),
        ContractError::Api(e) => format!("Api error: {}", e),
        ContractError::Deployment(e) => format!("Deployment error: {}", e),
        ContractError::InterfaceUnsupported => {
            "Contract does not support this interface.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web3::types::H160;

    #[test]
    fn keypair_accepts_prefixed_hex() {
        let key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let (_, a) = extract_keypair_from_str(&format!("0x{}", key)).unwrap();
        let (_, b) = extract_keypair_from_str(&format!(" {} ", key)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, H160::from_str("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23").unwrap());
        assert!(matches!(extract_keypair_from_str("zz"), Err(Error::Config(_))));
    }

    #[test]
    fn rejection_wording() {
        assert!(is_user_rejection("MetaMask Tx Signature: User denied transaction signature."));
        assert!(is_user_rejection("User rejected the request."));
        assert!(!is_user_rejection("insufficient funds for gas"));
    }

    #[test]
    fn duplicate_broadcast_wording() {
        assert!(is_already_known("already known"));
        assert!(is_already_known("Known transaction: 0xab12"));
        assert!(is_already_known("This transaction has already been processed"));
        assert!(!is_already_known("nonce too low"));
    }

    #[test]
    fn transport_errors_are_failures() {
        let unreachable = web3::Error::Unreachable;
        assert!(matches!(classify_web3_error(&unreachable), RpcError::Failed(_)));
    }
}

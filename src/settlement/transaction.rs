//! Spending transaction model
//!
//! Only the parts of a ledger transaction that settlement inspects: the
//! escrow outpoint being spent, the input's sequence number, the lock time
//! and the outputs.

use serde::{Serialize, Deserialize};
use serde_with::{serde_as, Bytes};
use crate::crypto::CryptoUtils;

/// Sequence value that disables the lock time
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

const OP_FALSE: u8 = 0x00;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(hash160: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(hash160);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_FALSE OP_RETURN ‖ payload`
pub fn data_script(payload: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(payload.len() + 2);
    script.push(OP_FALSE);
    script.push(OP_RETURN);
    script.extend_from_slice(payload);
    script
}

/// Payload carried by a data script, if `script` is one
pub fn data_script_payload(script: &[u8]) -> Option<&[u8]> {
    match script {
        [OP_FALSE, OP_RETURN, payload @ ..] => Some(payload),
        _ => None,
    }
}

/// Reference to the escrowed output
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPoint {
    #[serde_as(as = "Bytes")]
    pub txid: [u8; 32],
    pub vout: u32,
}

/// One transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in satoshis
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// The transaction spending the escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub escrow_outpoint: OutPoint,
    pub sequence: u32,
    pub lock_time: u32,
    pub outputs: Vec<TxOutput>,
}

impl TransactionContext {
    /// Transaction without a lock time
    pub fn new(escrow_outpoint: OutPoint, outputs: Vec<TxOutput>) -> Self {
        Self {
            escrow_outpoint,
            sequence: SEQUENCE_FINAL,
            lock_time: 0,
            outputs,
        }
    }

    /// Same transaction with the lock time enabled at `lock_time`
    pub fn with_lock_time(mut self, lock_time: u32) -> Self {
        self.sequence = SEQUENCE_FINAL - 1;
        self.lock_time = lock_time;
        self
    }

    /// Whether the input's sequence enables the lock time
    pub fn lock_time_enabled(&self) -> bool {
        self.sequence < SEQUENCE_FINAL
    }

    /// Canonical encoding signed by the poster on refund
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.escrow_outpoint.txid);
        bytes.extend_from_slice(&self.escrow_outpoint.vout.to_le_bytes());
        bytes.extend_from_slice(&self.sequence.to_le_bytes());
        bytes.extend_from_slice(&self.lock_time.to_le_bytes());
        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.value.to_le_bytes());
            bytes.extend_from_slice(&(output.script_pubkey.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&output.script_pubkey);
        }
        bytes
    }

    /// SHA-256d of the signing bytes
    pub fn sighash(&self) -> [u8; 32] {
        CryptoUtils::sha256d(&self.signing_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint() -> OutPoint {
        OutPoint { txid: [7u8; 32], vout: 1 }
    }

    #[test]
    fn test_scripts() {
        let script = p2pkh_script(&[0xab; 20]);
        assert_eq!(script.len(), 25);
        assert_eq!(hex::encode(&script[..3]), "76a914");
        assert_eq!(hex::encode(&script[23..]), "88ac");

        let data = data_script(&[1, 2, 3]);
        assert_eq!(hex::encode(&data), "006a010203");
        assert_eq!(data_script_payload(&data), Some(&[1u8, 2, 3][..]));
        assert_eq!(data_script_payload(&script), None);
    }

    #[test]
    fn test_sighash_covers_fields() {
        let outputs = vec![TxOutput { value: 10_000, script_pubkey: p2pkh_script(&[1; 20]) }];
        let base = TransactionContext::new(outpoint(), outputs.clone());
        assert!(!base.lock_time_enabled());

        let locked = base.clone().with_lock_time(761_406);
        assert!(locked.lock_time_enabled());
        assert_ne!(base.sighash(), locked.sighash());

        let mut other_value = base.clone();
        other_value.outputs[0].value = 9_999;
        assert_ne!(base.sighash(), other_value.sighash());

        let mut other_outpoint = base.clone();
        other_outpoint.escrow_outpoint.vout = 0;
        assert_ne!(base.sighash(), other_outpoint.sighash());

        assert_eq!(base.sighash(), TransactionContext::new(outpoint(), outputs).sighash());
    }
}

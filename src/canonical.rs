//! Canonical JSON for device display and signing.
//!
//! The device and any later verifier must hash identical bytes, so the
//! signable document is serialized with all object keys sorted (recursively,
//! arrays mapped element-wise) and null values omitted at every level. The
//! builder's natural field order never reaches the wire.

use serde_json::{Map, Value};

use crate::errors::LedgerError;
use crate::tx::{TxContext, UnsignedTx};

pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                let field = &fields[key];
                if !field.is_null() {
                    out.insert(key.clone(), canonicalize(field));
                }
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    }
}

/// Produces the byte sequence the device displays and signs: the canonical
/// form of `{account_number, chain_id, fee, memo, msgs, sequence}` with the
/// numeric account fields as decimal strings.
pub fn get_bytes_to_sign(tx: &UnsignedTx, ctx: &TxContext) -> Result<Vec<u8>, LedgerError> {
    let fee = tx.fee().ok_or(LedgerError::Precondition("fee"))?;

    let doc = serde_json::json!({
        "account_number": ctx.account_number().to_string(),
        "chain_id": ctx.chain_id(),
        "fee": fee,
        "memo": tx.memo(),
        "msgs": tx.messages(),
        "sequence": ctx.sequence().to_string(),
    });

    serde_json::to_vec(&canonicalize(&doc))
        .map_err(|e| LedgerError::MalformedResponse(format!("serialization failed: {}", e)))
}

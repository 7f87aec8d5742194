//! Unsigned transaction construction and signature assembly.
//!
//! A `TxContext` is immutable account state captured before building; the
//! `UnsignedTx` envelope only changes through the dedicated transforms
//! (`with_gas`, `apply_signature`), which always return a new value and never
//! touch the message list. Financial amounts are decimal minor-unit strings
//! throughout; no floating point reaches the signable payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::config::DEFAULT_MEMO;
use crate::errors::LedgerError;
use crate::msg::{Coin, Message, ProposalContent, VoteOption};

/// Account state every builder needs. Construct a fresh one per transaction;
/// the sequence changes with every signed transaction anyway.
#[derive(Clone, Debug, PartialEq)]
pub struct TxContext {
    chain_id: String,
    account_number: u64,
    sequence: u64,
    denom: String,
    bech32_address: String,
    public_key: Option<Vec<u8>>,
    memo: Option<String>,
}

impl TxContext {
    pub fn new(
        chain_id: &str,
        account_number: u64,
        sequence: u64,
        denom: &str,
        bech32_address: &str,
    ) -> Result<Self, LedgerError> {
        if chain_id.is_empty() {
            return Err(LedgerError::Precondition("chain_id"));
        }
        if denom.is_empty() {
            return Err(LedgerError::Precondition("denom"));
        }
        if bech32_address.is_empty() {
            return Err(LedgerError::Precondition("bech32_address"));
        }
        Ok(TxContext {
            chain_id: chain_id.to_string(),
            account_number,
            sequence,
            denom: denom.to_string(),
            bech32_address: bech32_address.to_string(),
            public_key: None,
            memo: None,
        })
    }

    pub fn with_public_key(mut self, compressed_pk: &[u8]) -> Self {
        self.public_key = Some(compressed_pk.to_vec());
        self
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn account_number(&self) -> u64 {
        self.account_number
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn denom(&self) -> &str {
        &self.denom
    }

    pub fn bech32_address(&self) -> &str {
        &self.bech32_address
    }

    pub fn public_key(&self) -> Option<&[u8]> {
        self.public_key.as_deref()
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StdFee {
    pub amount: Vec<Coin>,
    pub gas: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PubKeyEntry {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignatureEntry {
    pub signature: String,
    pub account_number: String,
    pub sequence: String,
    pub pub_key: PubKeyEntry,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct TxValue {
    msg: Vec<Message>,
    fee: Option<StdFee>,
    memo: String,
    signatures: Vec<SignatureEntry>,
}

/// The `auth/StdTx` envelope before signing. The fee stays empty until the
/// gas-application step runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnsignedTx {
    #[serde(rename = "type")]
    kind: String,
    value: TxValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct SignedTxValue {
    msg: Vec<Message>,
    fee: StdFee,
    memo: String,
    signatures: Vec<SignatureEntry>,
}

/// Terminal artifact: the envelope with exactly one signature, in the wire
/// shape the broadcast endpoint expects.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignedTx {
    #[serde(rename = "type")]
    kind: String,
    value: SignedTxValue,
}

impl UnsignedTx {
    /// Builds the base envelope around one or more messages.
    pub fn skeleton(ctx: &TxContext, msgs: Vec<Message>) -> Result<Self, LedgerError> {
        if msgs.is_empty() {
            return Err(LedgerError::Precondition("msg"));
        }
        Ok(UnsignedTx {
            kind: "auth/StdTx".to_string(),
            value: TxValue {
                msg: msgs,
                fee: None,
                memo: ctx.memo().unwrap_or(DEFAULT_MEMO).to_string(),
                signatures: vec![],
            },
        })
    }

    pub fn create_transfer(
        ctx: &TxContext,
        to_address: &str,
        amount: u64,
    ) -> Result<Self, LedgerError> {
        if to_address.is_empty() {
            return Err(LedgerError::Precondition("to_address"));
        }
        Self::skeleton(
            ctx,
            vec![Message::Send {
                amount: vec![Coin::new(amount, ctx.denom())],
                from_address: ctx.bech32_address().to_string(),
                to_address: to_address.to_string(),
            }],
        )
    }

    pub fn create_delegate(
        ctx: &TxContext,
        validator_address: &str,
        amount: u64,
    ) -> Result<Self, LedgerError> {
        if validator_address.is_empty() {
            return Err(LedgerError::Precondition("validator_address"));
        }
        Self::skeleton(
            ctx,
            vec![Message::Delegate {
                amount: Coin::new(amount, ctx.denom()),
                delegator_address: ctx.bech32_address().to_string(),
                validator_address: validator_address.to_string(),
            }],
        )
    }

    pub fn create_undelegate(
        ctx: &TxContext,
        validator_address: &str,
        amount: u64,
    ) -> Result<Self, LedgerError> {
        if validator_address.is_empty() {
            return Err(LedgerError::Precondition("validator_address"));
        }
        Self::skeleton(
            ctx,
            vec![Message::Undelegate {
                amount: Coin::new(amount, ctx.denom()),
                delegator_address: ctx.bech32_address().to_string(),
                validator_address: validator_address.to_string(),
            }],
        )
    }

    pub fn create_redelegate(
        ctx: &TxContext,
        validator_src: &str,
        validator_dst: &str,
        amount: u64,
    ) -> Result<Self, LedgerError> {
        if validator_src.is_empty() {
            return Err(LedgerError::Precondition("validator_src_address"));
        }
        if validator_dst.is_empty() {
            return Err(LedgerError::Precondition("validator_dst_address"));
        }
        Self::skeleton(
            ctx,
            vec![Message::BeginRedelegate {
                amount: Coin::new(amount, ctx.denom()),
                delegator_address: ctx.bech32_address().to_string(),
                validator_dst_address: validator_dst.to_string(),
                validator_src_address: validator_src.to_string(),
            }],
        )
    }

    pub fn create_submit_proposal(
        ctx: &TxContext,
        title: &str,
        description: &str,
        deposit: u64,
    ) -> Result<Self, LedgerError> {
        if title.is_empty() {
            return Err(LedgerError::Precondition("title"));
        }
        Self::skeleton(
            ctx,
            vec![Message::SubmitProposal {
                content: ProposalContent::Text {
                    description: description.to_string(),
                    title: title.to_string(),
                },
                initial_deposit: vec![Coin::new(deposit, ctx.denom())],
                proposer: ctx.bech32_address().to_string(),
            }],
        )
    }

    pub fn create_vote(
        ctx: &TxContext,
        proposal_id: u64,
        option: VoteOption,
    ) -> Result<Self, LedgerError> {
        Self::skeleton(
            ctx,
            vec![Message::Vote {
                option: option.code(),
                proposal_id: proposal_id.to_string(),
                voter: ctx.bech32_address().to_string(),
            }],
        )
    }

    pub fn create_deposit(
        ctx: &TxContext,
        proposal_id: u64,
        amount: u64,
    ) -> Result<Self, LedgerError> {
        Self::skeleton(
            ctx,
            vec![Message::Deposit {
                amount: vec![Coin::new(amount, ctx.denom())],
                depositor: ctx.bech32_address().to_string(),
                proposal_id: proposal_id.to_string(),
            }],
        )
    }

    /// Overwrites the fee from the gas limit and unit price. The fee amount
    /// rounds half away from zero, then becomes a decimal string.
    pub fn with_gas(&self, gas: u64, gas_price: f64, denom: &str) -> Self {
        let fee_amount = (gas as f64 * gas_price).round() as u64;
        let mut tx = self.clone();
        tx.value.fee = Some(StdFee {
            amount: vec![Coin {
                amount: fee_amount.to_string(),
                denom: denom.to_string(),
            }],
            gas: gas.to_string(),
        });
        tx
    }

    pub fn messages(&self) -> &[Message] {
        &self.value.msg
    }

    pub fn fee(&self) -> Option<&StdFee> {
        self.value.fee.as_ref()
    }

    pub fn memo(&self) -> &str {
        &self.value.memo
    }
}

impl SignedTx {
    pub fn signatures(&self) -> &[SignatureEntry] {
        &self.value.signatures
    }

    pub fn messages(&self) -> &[Message] {
        &self.value.msg
    }
}

/// Decodes a DER signature to the 64-byte compact r‖s form the chain's wire
/// format requires. The device always answers in DER.
pub fn signature_der_to_compact(der: &[u8]) -> Result<[u8; 64], LedgerError> {
    let signature = secp256k1::ecdsa::Signature::from_der(der)
        .map_err(|e| LedgerError::MalformedResponse(format!("invalid DER signature: {}", e)))?;
    Ok(signature.serialize_compact())
}

/// Merges a raw device signature with the account metadata into the final
/// signed envelope. Refused when the context lacks the public key or the
/// transaction never got a fee.
pub fn apply_signature(
    tx: &UnsignedTx,
    ctx: &TxContext,
    der_signature: &[u8],
) -> Result<SignedTx, LedgerError> {
    let public_key = ctx.public_key().ok_or(LedgerError::Precondition("public_key"))?;
    let fee = tx.value.fee.clone().ok_or(LedgerError::Precondition("fee"))?;
    let compact = signature_der_to_compact(der_signature)?;

    Ok(SignedTx {
        kind: tx.kind.clone(),
        value: SignedTxValue {
            msg: tx.value.msg.clone(),
            fee,
            memo: tx.value.memo.clone(),
            signatures: vec![SignatureEntry {
                signature: BASE64.encode(compact),
                account_number: ctx.account_number().to_string(),
                sequence: ctx.sequence().to_string(),
                pub_key: PubKeyEntry {
                    key_type: "tendermint/PubKeySecp256k1".to_string(),
                    value: BASE64.encode(public_key),
                },
            }],
        },
    })
}

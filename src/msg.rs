//! Every message kind the signable envelope can carry, as a tagged variant.
//!
//! The tag strings are the amino route names the chain expects in the
//! `auth/StdTx` envelope. Unknown tags fail deserialization outright rather
//! than being dropped.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: String,
    pub denom: String,
}

impl Coin {
    pub fn new(amount: u64, denom: &str) -> Self {
        Coin {
            amount: amount.to_string(),
            denom: denom.to_string(),
        }
    }
}

/// One input or output of a multi-send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IoEntry {
    pub address: String,
    pub coins: Vec<Coin>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorDescription {
    pub moniker: String,
    pub identity: Option<String>,
    pub website: Option<String>,
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionRates {
    pub rate: String,
    pub max_rate: String,
    pub max_change_rate: String,
}

/// Governance proposal content. Only text proposals are built here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ProposalContent {
    #[serde(rename = "cosmos-sdk/TextProposal")]
    Text { description: String, title: String },
}

/// A resource attached to a starname account, e.g. a chain address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub resource: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Message {
    // bank
    #[serde(rename = "cosmos-sdk/MsgSend")]
    Send {
        amount: Vec<Coin>,
        from_address: String,
        to_address: String,
    },
    #[serde(rename = "cosmos-sdk/MsgMultiSend")]
    MultiSend {
        inputs: Vec<IoEntry>,
        outputs: Vec<IoEntry>,
    },

    // staking
    #[serde(rename = "cosmos-sdk/MsgCreateValidator")]
    CreateValidator {
        description: ValidatorDescription,
        commission: CommissionRates,
        min_self_delegation: String,
        delegator_address: String,
        validator_address: String,
        pubkey: String,
        value: Coin,
    },
    #[serde(rename = "cosmos-sdk/MsgEditValidator")]
    EditValidator {
        description: ValidatorDescription,
        validator_address: String,
        commission_rate: Option<String>,
        min_self_delegation: Option<String>,
    },
    #[serde(rename = "cosmos-sdk/MsgDelegate")]
    Delegate {
        amount: Coin,
        delegator_address: String,
        validator_address: String,
    },
    #[serde(rename = "cosmos-sdk/MsgUndelegate")]
    Undelegate {
        amount: Coin,
        delegator_address: String,
        validator_address: String,
    },
    #[serde(rename = "cosmos-sdk/MsgBeginRedelegate")]
    BeginRedelegate {
        amount: Coin,
        delegator_address: String,
        validator_dst_address: String,
        validator_src_address: String,
    },

    // distribution
    #[serde(rename = "cosmos-sdk/MsgWithdrawValidatorCommission")]
    WithdrawValidatorCommission { validator_address: String },
    #[serde(rename = "cosmos-sdk/MsgWithdrawDelegatorReward")]
    WithdrawDelegatorReward {
        delegator_address: String,
        validator_address: String,
    },
    #[serde(rename = "cosmos-sdk/MsgModifyWithdrawAddress")]
    ModifyWithdrawAddress {
        delegator_address: String,
        withdraw_address: String,
    },

    // governance
    #[serde(rename = "cosmos-sdk/MsgSubmitProposal")]
    SubmitProposal {
        content: ProposalContent,
        initial_deposit: Vec<Coin>,
        proposer: String,
    },
    #[serde(rename = "cosmos-sdk/MsgDeposit")]
    Deposit {
        amount: Vec<Coin>,
        depositor: String,
        proposal_id: String,
    },
    #[serde(rename = "cosmos-sdk/MsgVote")]
    Vote {
        option: u32,
        proposal_id: String,
        voter: String,
    },

    // slashing
    #[serde(rename = "cosmos-sdk/MsgUnjail")]
    Unjail { address: String },

    // ibc
    #[serde(rename = "cosmos-sdk/IBCTransferMsg")]
    IbcTransfer {
        amount: Coin,
        sender: String,
        receiver: String,
        source_port: String,
        source_channel: String,
    },
    #[serde(rename = "cosmos-sdk/IBCReceiveMsg")]
    IbcReceive {
        amount: Coin,
        sender: String,
        receiver: String,
        source_port: String,
        source_channel: String,
    },

    // starname
    #[serde(rename = "starname/RegisterDomain")]
    RegisterDomain {
        admin: String,
        domain: String,
        #[serde(rename = "type")]
        domain_type: String,
        broker: Option<String>,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/RegisterAccount")]
    RegisterAccount {
        domain: String,
        name: String,
        owner: String,
        broker: Option<String>,
        fee_payer: Option<String>,
        resources: Vec<Resource>,
    },
    #[serde(rename = "starname/AddAccountCertificates")]
    AddAccountCertificates {
        domain: String,
        name: String,
        owner: String,
        new_certificate: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/DeleteAccount")]
    DeleteAccount {
        domain: String,
        name: String,
        owner: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/DeleteAccountCertificates")]
    DeleteAccountCertificates {
        domain: String,
        name: String,
        owner: String,
        delete_certificate: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/DeleteDomain")]
    DeleteDomain {
        domain: String,
        owner: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/RenewAccount")]
    RenewAccount {
        domain: String,
        name: String,
        signer: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/RenewDomain")]
    RenewDomain {
        domain: String,
        signer: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/ReplaceAccountResources")]
    ReplaceAccountResources {
        domain: String,
        name: String,
        owner: String,
        new_resources: Vec<Resource>,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/SetAccountMetadata")]
    SetAccountMetadata {
        domain: String,
        name: String,
        owner: String,
        new_metadata_uri: String,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/TransferAccount")]
    TransferAccount {
        domain: String,
        name: String,
        owner: String,
        new_owner: String,
        reset: bool,
        fee_payer: Option<String>,
    },
    #[serde(rename = "starname/TransferDomainAll")]
    TransferDomainAll {
        domain: String,
        owner: String,
        new_owner: String,
        fee_payer: Option<String>,
    },
}

/// On-chain vote options, encoded numerically in the signable payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOption {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

impl VoteOption {
    pub fn code(self) -> u32 {
        match self {
            VoteOption::Yes => 1,
            VoteOption::Abstain => 2,
            VoteOption::No => 3,
            VoteOption::NoWithVeto => 4,
        }
    }
}

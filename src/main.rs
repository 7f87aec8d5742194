use clap::{Parser, Subcommand};

use iov_ledger_client::session::{HidConnector, TcpConnector};
use iov_ledger_client::{LedgerConfig, LedgerSession, TxContext, UnsignedTx};

#[derive(Parser)]
#[command(name = "iov-ledger-cli", about = "Sign IOV transactions with a Ledger device")]
struct Args {
    /// Use the HID interface for a real device, instead of Speculos
    #[arg(long)]
    hid: bool,

    #[arg(long, default_value = "iov-mainnet-2")]
    chain_id: String,

    #[arg(long, default_value = "star")]
    prefix: String,

    #[arg(long, default_value_t = 0.025)]
    gas_price: f64,

    /// Accept an app running in test mode. Never use this on mainnet.
    #[arg(long)]
    test_mode_allowed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the account address and public key
    Address {
        /// Also display the address on the device and wait for confirmation
        #[arg(long)]
        confirm: bool,
    },
    /// Build, sign and print a transfer transaction
    Transfer {
        to: String,
        amount: u64,
        #[arg(long)]
        account_number: u64,
        #[arg(long)]
        sequence: u64,
        #[arg(long, default_value_t = iov_ledger_client::config::DEFAULT_GAS)]
        gas: u64,
        #[arg(long)]
        memo: Option<String>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = LedgerConfig::new(
        &args.chain_id,
        &args.prefix,
        args.gas_price,
        args.test_mode_allowed,
    );

    let mut session = if args.hid {
        LedgerSession::new(config.clone(), Box::new(HidConnector::new(&args.prefix)))
    } else {
        let addr = "127.0.0.1:9999".parse()?;
        LedgerSession::new(config.clone(), Box::new(TcpConnector::new(addr, &args.prefix)))
    };

    match args.command {
        Command::Address { confirm } => {
            let info = session.get_address().await?;
            println!("address: {}", info.bech32_address);
            println!("public key: {}", hex::encode(&info.compressed_pk));
            if confirm {
                session.confirm_address().await?;
                println!("address confirmed on device");
            }
        }
        Command::Transfer {
            to,
            amount,
            account_number,
            sequence,
            gas,
            memo,
        } => {
            let address = session.get_address().await?;
            let mut ctx = TxContext::new(
                &config.chain_id,
                account_number,
                sequence,
                &config.denom,
                &address.bech32_address,
            )?
            .with_public_key(&address.compressed_pk);
            if let Some(memo) = memo {
                ctx = ctx.with_memo(&memo);
            }

            let tx = UnsignedTx::create_transfer(&ctx, &to, amount)?
                .with_gas(gas, config.gas_price, &config.denom);
            let signed = session.sign_tx(&tx, &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&signed)?);
        }
    }

    session.disconnect().await;
    Ok(())
}

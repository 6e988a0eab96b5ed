use clap::Parser;
use seqkv::client::{dump, get, reset, write, Action, Response};
use seqkv::diagnostics::check_cluster;
use tokio::net::TcpStream;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(long = "addr", global = true, default_value = seqkv::DEFAULT_ADDR)]
    server: String,

    #[clap(subcommand)]
    subcmd: Action,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = App::parse();
    match cli.subcmd {
        Action::Write { key, value } => {
            match write(&mut TcpStream::connect(&cli.server).await?, key, value).await? {
                Response::Written {
                    seq,
                    quorum_reached: true,
                    message,
                } => println!("{message}, seq {seq}"),
                Response::Written { seq, message, .. } => {
                    eprintln!("{message}, seq {seq} is committed on the leader only");
                    std::process::exit(1);
                }
                Response::Unsupported { role, .. } => {
                    eprintln!("{} is a {role} and does not accept writes", cli.server);
                    std::process::exit(1);
                }
                other => anyhow::bail!("unexpected response: {other:?}"),
            }
        }
        Action::Get { key } => match get(&mut TcpStream::connect(&cli.server).await?, key).await? {
            Some(record) => println!("{} (seq {})", record.value, record.seq),
            None => {
                eprintln!("Key not found");
                std::process::exit(1);
            }
        },
        Action::Dump => {
            let (role, entries) = dump(&mut TcpStream::connect(&cli.server).await?).await?;
            println!("role: {role}");
            for (key, record) in entries {
                println!("{key}\t{}\t{}", record.value, record.seq);
            }
        }
        Action::Reset => {
            reset(&mut TcpStream::connect(&cli.server).await?).await?;
            println!("Store cleared");
        }
        Action::Check { followers } => {
            let reports = check_cluster(&cli.server, &followers).await?;
            let mut consistent = true;
            for (follower, report) in reports {
                consistent &= report.is_consistent();
                println!("{follower}: {report}");
            }
            if !consistent {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

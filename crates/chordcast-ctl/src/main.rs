//! chordcast-ctl: command-line client for chordcast discovery nodes.

mod cmd;

use anyhow::{Context, Result};

use chordcast_core::wire::DEFAULT_ADDRESS_BITS;
use cmd::discovery::{self, Target};
use cmd::status;

const DEFAULT_API_PORT: u16 = 9100;
const DEFAULT_ATTEMPTS: u32 = 500;

fn print_usage() {
    println!("Usage: chordcast-ctl [options] <command>");
    println!();
    println!("Discovery commands:");
    println!("  register <pub|sub|broker> <id> <addr> <port> [topics...]");
    println!("  ready                   Ask whether the system has reached its quorum");
    println!("  wait-ready              Poll until the system is ready");
    println!("  lookup <topics...>      Publishers for the topics (retries while not ready)");
    println!("  lookup-all              Every publisher in the system");
    println!("  hash <topic> [bits]     Ring position of a topic");
    println!();
    println!("Status commands (need network.api_port on the daemon):");
    println!("  status                  Node status and counts");
    println!("  ring                    Ring membership");
    println!("  fingers                 Finger table");
    println!("  registrations           Registrants stored on the node");
    println!("  topic <name>            Hash and owner of a topic");
    println!();
    println!("Options:");
    println!("  --node <host:port>      Discovery node to contact");
    println!("  --topology <file>       Contact a random node from a topology file");
    println!("  --api-port <port>       Status API port (default: {})", DEFAULT_API_PORT);
    println!("  --attempts <n>          Polls for wait-ready and lookup (default: {})", DEFAULT_ATTEMPTS);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_API_PORT;
    let mut attempts = DEFAULT_ATTEMPTS;
    let mut target = Target::default();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--api-port requires a value")?
                    .parse()
                    .context("--api-port must be a number")?;
            }
            "--attempts" => {
                i += 1;
                attempts = args
                    .get(i)
                    .context("--attempts requires a value")?
                    .parse()
                    .context("--attempts must be a number")?;
            }
            "--node" => {
                i += 1;
                target = Target::Node(args.get(i).context("--node requires host:port")?.clone());
            }
            "--topology" => {
                i += 1;
                target = Target::Topology(args.get(i).context("--topology requires a path")?.into());
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["register", rest @ ..] => discovery::cmd_register(&target, rest).await,
        ["ready"] => discovery::cmd_ready(&target).await,
        ["wait-ready"] => discovery::cmd_wait_ready(&target, attempts).await,
        ["lookup", topics @ ..] if !topics.is_empty() => {
            discovery::cmd_lookup(&target, topics, attempts).await
        }
        ["lookup-all"] => discovery::cmd_lookup_all(&target).await,
        ["hash", topic] => discovery::cmd_hash(topic, DEFAULT_ADDRESS_BITS),
        ["hash", topic, bits] => {
            discovery::cmd_hash(topic, bits.parse().context("bits must be a number")?)
        }
        ["status"] | [] => status::cmd_status(port).await,
        ["ring"] => status::cmd_ring(port).await,
        ["fingers"] => status::cmd_fingers(port).await,
        ["registrations"] => status::cmd_registrations(port).await,
        ["topic", name] => status::cmd_topic(port, name).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

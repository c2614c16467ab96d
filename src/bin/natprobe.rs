use std::io::{self, Write};
use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::net::lookup_host;

use natprobe::{addr, discover, init_logging, ClientConfig, StunClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "STUN client and RFC 3489 NAT type discovery", long_about = None)]
struct Args {
    /// Host name of the STUN server
    #[arg(long)]
    host: String,

    /// UDP port of the STUN server
    #[arg(long, default_value_t = 3478)]
    port: u16,

    /// Verbosity (0 = quiet, 1 = per-step trace, 2 = packet dumps)
    #[arg(long, default_value_t = 0)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(match args.verbose {
        0 => "warn",
        1 => "natprobe=info",
        _ => "natprobe=trace",
    });

    let ips = resolve(&args.host, args.port).await?;
    println!("Host : {}", args.host);
    println!("Port : {}", args.port);
    for (index, ip) in ips.iter().enumerate() {
        println!("IP{index}  : {}", addr::ip_text(ip));
    }

    let ip = if ips.len() > 1 {
        choose_address(&ips)?
    } else {
        ips[0]
    };

    let server = addr::make_transport(&addr::ip_text(&ip), args.port)?;
    println!("\nUsing transport address \"{server}\".\n");

    let client = StunClient::new(ClientConfig::new(server))?;
    let nat = discover(&client).await?;

    println!("Conclusion: {nat}.");
    Ok(())
}

/// Resolve the server host name into its distinct IP addresses.
async fn resolve(host: &str, port: u16) -> Result<Vec<IpAddr>> {
    let addrs = lookup_host((host, port))
        .await
        .with_context(|| format!("can not lookup host \"{host}\""))?;

    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !ips.contains(&addr.ip()) {
            ips.push(addr.ip());
        }
    }
    if ips.is_empty() {
        bail!("host \"{host}\" did not resolve to any address");
    }
    Ok(ips)
}

/// Let the user pick one address when the host resolves to several.
fn choose_address(ips: &[IpAddr]) -> Result<IpAddr> {
    println!(
        "\nThe host name resolves to {} addresses. Which one should be used?",
        ips.len()
    );

    loop {
        print!("Enter an index between 0 and {}: ", ips.len() - 1);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            bail!("no address selected");
        }
        match line.trim().parse::<usize>() {
            Ok(index) if index < ips.len() => return Ok(ips[index]),
            _ => println!("\"{}\" is not a valid index.", line.trim()),
        }
    }
}

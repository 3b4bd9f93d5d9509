use anyhow::{Context, bail};
use clap::Parser;
use hash_swarm::candidate::{CandidateSpace, Dictionary, LengthRange, SpaceSpec, alphabet};
use hash_swarm::chunking::ChunkPolicy;
use hash_swarm::cluster::{PeerId, SharedCluster, Target, TargetChange, now_ms};
use hash_swarm::config::NodeConfig;
use hash_swarm::coordinator::{Coordinator, router};
use hash_swarm::fingerprint::{DigestAlgorithm, Fingerprint};
use hash_swarm::gossip::{Discovery, UdpTransport, ensure_target_fits};
use hash_swarm::worker::{WorkerPool, WorkerState};
use rand::Rng;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hash-swarm",
    version,
    about = "Search a candidate space for a fingerprint together with every peer on the LAN"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gossip socket address.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Seed peer; repeat for several. Switches discovery to the peer list.
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Multicast group, joined on the bind port.
    #[arg(long, conflicts_with_all = ["peers", "broadcast"])]
    multicast: Option<Ipv4Addr>,

    /// Subnet broadcast address.
    #[arg(long, conflicts_with = "peers")]
    broadcast: Option<SocketAddr>,

    #[arg(long)]
    peer_id: Option<String>,

    /// Propose a search for the fingerprint of this password.
    #[arg(long, conflicts_with_all = ["fingerprint", "random_target"])]
    password: Option<String>,

    /// Propose a search for this hex fingerprint.
    #[arg(long, conflicts_with = "random_target")]
    fingerprint: Option<String>,

    /// Propose a search for a random candidate of the space.
    #[arg(long)]
    random_target: bool,

    /// Named set (lower, upper, letters, digits, alnum, hex, punct, printable)
    /// or literal symbols.
    #[arg(long, default_value = "lower")]
    alphabet: String,

    #[arg(long, default_value_t = 1)]
    min_len: u32,

    #[arg(long, default_value_t = 4)]
    max_len: u32,

    /// Per-position mask such as `?u?l?l?d`; replaces the alphabet.
    #[arg(long, conflicts_with = "wordlist")]
    mask: Option<String>,

    /// Word list, one candidate per line; replaces the alphabet.
    #[arg(long)]
    wordlist: Option<PathBuf>,

    #[arg(long, default_value_t = 100_000)]
    chunk_size: u64,

    /// Split the space into this many equal chunks instead.
    #[arg(long)]
    adaptive: Option<u64>,

    /// md5, sha1, sha256 or sha512.
    #[arg(long, default_value = "sha256")]
    algorithm: String,

    #[arg(long)]
    workers: Option<usize>,

    /// Serve `/status` and `/peers` on this address.
    #[arg(long)]
    http: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // 1. Configuration: file, environment, then flags.
    let mut config = NodeConfig::load(cli.config.as_deref())?;
    apply_cli(&mut config, &cli);
    config.validate()?;

    let local = config
        .peer_id
        .clone()
        .map(PeerId)
        .unwrap_or_default();

    // 2. Transport and coordinator:
    let transport = UdpTransport::bind(
        config.bind,
        config.discovery.clone(),
        config.timings.send_timeout(),
    )
    .await
    .context("failed to open the gossip socket")?;

    let coordinator = Coordinator::new(
        SharedCluster::with_claim_ttl(local.clone(), config.timings.reclaim_ttl()),
        Arc::new(transport),
        config.timings.clone(),
    );
    coordinator.start();
    tracing::info!("Peer {} joined via {}", local, config.discovery);

    // 3. Optional status endpoint:
    if let Some(http_addr) = config.http {
        let app = router(coordinator.clone());
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        tracing::info!("HTTP status listening on {}", http_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HTTP server failed: {}", e);
            }
        });
    }

    // 4. Stats reporter:
    let stats_coordinator = coordinator.clone();
    tokio::spawn(async move {
        let shutdown = stats_coordinator.shutdown_token();
        let mut interval = tokio::time::interval(stats_coordinator.timings().status_interval());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let status = stats_coordinator.status_snapshot();
            tracing::info!(
                "Cluster stats: {} peer(s), {}/{} chunks completed, {} claimed, {} local",
                status.peers.len(),
                status.completed,
                status.total_chunks,
                status.claimed,
                status.in_flight.len()
            );
        }
    });

    // 5. Agree on a Target:
    search_settings(&cli)?;
    let proposal = build_proposal(&cli, &local)?;
    let target = match coordinator.establish_target(proposal).await {
        Some(target) => target,
        None => prompt_for_target(&cli, &local, &coordinator).await?,
    };
    tracing::info!(
        "Searching for {} ({}, {})",
        target.fingerprint,
        target.algorithm,
        target.space.describe()
    );

    // 6. Work until found, exhausted or interrupted:
    let pool = WorkerPool::new(coordinator.clone(), config.workers, config.poll_interval);
    let state = tokio::select! {
        state = pool.run() => state,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            coordinator.shutdown().await;
            WorkerState::Stopped
        }
    };

    let status = coordinator.status_snapshot();
    match (&status.found, state) {
        (Some(found), _) => {
            println!("FOUND: {} (by {} in chunk {})", found.candidate, found.finder, found.chunk_id);
        }
        (None, WorkerState::Exhausted) => {
            println!("NOT FOUND: every candidate was searched");
        }
        (None, _) => {
            println!("Search stopped before completion");
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

fn apply_cli(config: &mut NodeConfig, cli: &Cli) {
    if let Some(bind) = cli.bind {
        config.bind = bind;
        if let Discovery::Multicast { port, .. } = &mut config.discovery {
            *port = bind.port();
        }
    }
    if !cli.peers.is_empty() {
        config.discovery = Discovery::Peers {
            seeds: cli.peers.clone(),
        };
    }
    if let Some(group) = cli.multicast {
        config.discovery = Discovery::Multicast {
            group,
            port: config.bind.port(),
        };
    }
    if let Some(addr) = cli.broadcast {
        config.discovery = Discovery::Broadcast { addr };
    }
    if let Some(peer_id) = &cli.peer_id {
        config.peer_id = Some(peer_id.clone());
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(http) = cli.http {
        config.http = Some(http);
    }
}

fn space_spec(cli: &Cli) -> anyhow::Result<SpaceSpec> {
    if let Some(pattern) = &cli.mask {
        return Ok(SpaceSpec::Mask {
            pattern: pattern.clone(),
        });
    }
    if let Some(path) = &cli.wordlist {
        let dictionary = Dictionary::load(path)?;
        return Ok(SpaceSpec::Dictionary {
            words: dictionary.words().to_vec(),
        });
    }
    Ok(SpaceSpec::BruteForce {
        alphabet: alphabet::resolve(&cli.alphabet),
        lengths: LengthRange::new(cli.min_len, cli.max_len)?,
    })
}

fn chunk_policy(cli: &Cli) -> ChunkPolicy {
    match cli.adaptive {
        Some(workers) => ChunkPolicy::Adaptive { workers },
        None => ChunkPolicy::Fixed {
            chunk_size: cli.chunk_size,
        },
    }
}

/// The space and chunk policy from the flags, checked the way peers check a
/// Target before adopting it.
fn search_settings(cli: &Cli) -> anyhow::Result<(SpaceSpec, ChunkPolicy)> {
    let space = space_spec(cli)?;
    let policy = chunk_policy(cli);
    let size = space.build()?.size();
    policy
        .plan(size)
        .with_context(|| format!("invalid chunking for {}", space.describe()))?;
    Ok((space, policy))
}

fn new_target(cli: &Cli, local: &PeerId, fingerprint: Fingerprint) -> anyhow::Result<Target> {
    let (space, policy) = search_settings(cli)?;
    let target = Target {
        fingerprint,
        algorithm: cli.algorithm.parse()?,
        space,
        policy,
        creator: local.clone(),
        created_at: now_ms(),
    };
    ensure_target_fits(&target)?;
    Ok(target)
}

/// Builds a Target for a plaintext, refusing one the space cannot contain.
fn target_for_password(cli: &Cli, local: &PeerId, password: &str) -> anyhow::Result<Target> {
    let algorithm: DigestAlgorithm = cli.algorithm.parse()?;
    let space = space_spec(cli)?.build()?;
    space
        .encode(password)
        .context("password is outside the configured candidate space")?;
    new_target(cli, local, algorithm.fingerprint_of(password))
}

fn build_proposal(cli: &Cli, local: &PeerId) -> anyhow::Result<Option<Target>> {
    if let Some(password) = &cli.password {
        return target_for_password(cli, local, password).map(Some);
    }

    if let Some(hex) = &cli.fingerprint {
        let algorithm: DigestAlgorithm = cli.algorithm.parse()?;
        let fingerprint = Fingerprint::from_hex(hex)?;
        if fingerprint.as_bytes().len() != algorithm.output_len() {
            bail!(
                "a {} fingerprint is {} bytes, got {}",
                algorithm,
                algorithm.output_len(),
                fingerprint.as_bytes().len()
            );
        }
        return new_target(cli, local, fingerprint).map(Some);
    }

    if cli.random_target {
        let space = space_spec(cli)?.build()?;
        let index = rand::thread_rng().gen_range(0..space.size());
        let secret = space.decode(index)?;
        tracing::info!("Random target picked at index {}", index);
        return target_for_password(cli, local, &secret).map(Some);
    }

    Ok(None)
}

async fn prompt_for_target(
    cli: &Cli,
    local: &PeerId,
    coordinator: &Arc<Coordinator>,
) -> anyhow::Result<Target> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        // A Target may have arrived while we were waiting on the operator.
        if let Some(target) = coordinator.cluster().target() {
            return Ok(target);
        }

        print!("No search running on the network. Password to search for: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            bail!("stdin closed before a password was entered");
        };
        let password = line.trim_end_matches(['\r', '\n']);

        match target_for_password(cli, local, password) {
            Ok(target) => {
                if coordinator.propose_target(target).await == TargetChange::Rejected {
                    bail!("the cluster rejected the proposed target");
                }
                if let Some(target) = coordinator.cluster().target() {
                    return Ok(target);
                }
            }
            Err(e) => eprintln!("{:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("hash-swarm").chain(args.iter().copied()))
    }

    #[test]
    fn test_zero_adaptive_chunks_fail_up_front() {
        let err = search_settings(&cli(&["--adaptive", "0"])).unwrap_err();

        assert!(format!("{:#}", err).contains("invalid chunking"));
    }

    #[test]
    fn test_password_target_uses_selected_algorithm() {
        let args = cli(&["--alphabet", "ab12", "--max-len", "4", "--algorithm", "sha1"]);

        let target = target_for_password(&args, &PeerId::from("A"), "ab12").unwrap();

        assert_eq!(target.algorithm, DigestAlgorithm::Sha1);
        assert_eq!(target.fingerprint, DigestAlgorithm::Sha1.fingerprint_of("ab12"));
        assert!(target_for_password(&args, &PeerId::from("A"), "zz").is_err());
    }

    #[test]
    fn test_oversized_wordlist_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        let words: Vec<String> = (0..20_000).map(|i| format!("word-{:08}", i)).collect();
        std::fs::write(&path, words.join("\n")).unwrap();
        let args = cli(&["--wordlist", path.to_str().unwrap()]);

        let err = target_for_password(&args, &PeerId::from("A"), "word-00000001").unwrap_err();

        assert!(format!("{:#}", err).contains("too large"));
    }
}

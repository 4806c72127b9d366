use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use devnet_express::chain::{create_network_file, create_wallet};
use devnet_express::logger::{init_logger, init_logger_detailed};
use devnet_express::{
    reset_node, resolve_checkpoint_path, run_checkpoint, run_node, ChainDescriptor, ChainError,
    CheckpointEngine, EngineConfig, Result, RpcNodeRuntime,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const USAGE: &str = "usage:
  devnet-express create <output> [count]
  devnet-express wallet <chain> <name>
  devnet-express checkpoint create <chain> [name]
  devnet-express checkpoint restore <chain> <archive> [--force]
  devnet-express checkpoint run <chain> <archive>
  devnet-express reset <chain> <index>
  devnet-express run <chain> [index] [--discard]";

fn usage() -> ChainError {
    ChainError::InvalidSetting {
        name: "arguments",
        reason: USAGE.to_string(),
    }
}

fn parse_index(value: Option<&str>) -> Result<usize> {
    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| ChainError::InvalidSetting {
            name: "index",
            reason: format!("{} is not a node index", value),
        }),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            token.cancel();
        }
    });
}

async fn run(args: &[String], config: EngineConfig) -> Result<()> {
    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();
    let flag = |name: &str| args.iter().any(|a| a == name);

    match positional.as_slice() {
        ["create", output, rest @ ..] => {
            let count = match rest.first() {
                Some(count) => count.parse().map_err(|_| ChainError::InvalidSetting {
                    name: "count",
                    reason: format!("{} is not a node count", count),
                })?,
                None => 1,
            };
            let chain = create_network_file(Path::new(output), count, &config)?;
            info!(output = %output, magic = chain.magic, nodes = count, "Network created");
        }
        ["wallet", chain_path, name] => {
            let chain_path = Path::new(chain_path);
            let mut chain = ChainDescriptor::load(chain_path)?;
            let wallet = create_wallet(&chain, name)?;
            let address = wallet.default_account().map(|a| a.address()).unwrap_or_default();
            chain.wallets.push(wallet);
            chain.save(chain_path)?;
            info!(wallet = %name, %address, "Wallet added");
        }
        ["checkpoint", "create", chain_path, rest @ ..] => {
            let chain = ChainDescriptor::load(Path::new(chain_path))?;
            let archive = resolve_checkpoint_path(rest.first().copied())?;
            let token = CancellationToken::new();
            cancel_on_ctrl_c(token.clone());
            let engine = CheckpointEngine::from_config(config)?;
            let outcome = engine.create(&chain, &archive, &token).await?;
            info!(path = %outcome.path.display(), mode = ?outcome.mode, "Checkpoint created");
        }
        ["checkpoint", "restore", chain_path, archive] => {
            let chain = ChainDescriptor::load(Path::new(chain_path))?;
            let engine = CheckpointEngine::from_config(config)?;
            let restored = engine.restore(&chain, Path::new(archive), flag("--force"))?;
            info!(path = %restored.display(), "Checkpoint restored");
        }
        ["checkpoint", "run", chain_path, archive] => {
            let chain = ChainDescriptor::load(Path::new(chain_path))?;
            let token = CancellationToken::new();
            cancel_on_ctrl_c(token.clone());
            let archive = PathBuf::from(archive);
            run_checkpoint(&RpcNodeRuntime::new(), &chain, &archive, &config, token).await?;
        }
        ["reset", chain_path, index] => {
            let chain = ChainDescriptor::load(Path::new(chain_path))?;
            reset_node(&chain, parse_index(Some(*index))?, &config)?;
        }
        ["run", chain_path, rest @ ..] => {
            let chain = ChainDescriptor::load(Path::new(chain_path))?;
            let index = parse_index(rest.first().copied())?;
            let token = CancellationToken::new();
            cancel_on_ctrl_c(token.clone());
            run_node(&RpcNodeRuntime::new(), &chain, index, &config, flag("--discard"), token).await?;
        }
        _ => return Err(usage()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let long_running = matches!(args.first().map(String::as_str), Some("run"))
        || matches!(args.get(1).map(String::as_str), Some("run"));
    if long_running {
        init_logger_detailed();
    } else {
        init_logger();
    }

    let result = match EngineConfig::from_env() {
        Ok(config) => run(&args, config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = ?e.kind(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use yield_rebalancer::core::config::{AppConfig, CustodyKeys};
use yield_rebalancer::core::types::Address;
use yield_rebalancer::strategies::common::{Strategy, StrategyDeps, StrategyInstance};
use yield_rebalancer::strategies::yield_rebalance::domain::network::{Asset, Protocol};
use yield_rebalancer::strategies::yield_rebalance::infrastructure::{
    HttpCustodyClient, HttpYieldOracle, JsonRpcChainReader, JsonWalletStore,
};
use yield_rebalancer::strategies::yield_rebalance::{ManualOperations, RebalanceStrategy};
use yield_rebalancer::utils::{init_logger, WebhookNotifier};

#[derive(Parser)]
#[command(name = "rebalancer", version, about = "收益率调仓服务")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/rebalancer.yml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 按周期调仓，直到 Ctrl-C
    Run,
    /// 立即执行一个周期并输出报告
    Once,
    /// 只规划不执行
    Plan,
    /// approve + stake
    Stake {
        #[arg(long)]
        user: String,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        protocol: String,
        #[arg(long)]
        amount: f64,
    },
    /// 从协议取回全部质押
    Unstake {
        #[arg(long)]
        user: String,
        #[arg(long)]
        protocol: String,
    },
    /// approve + swap
    Swap {
        #[arg(long)]
        user: String,
        #[arg(long)]
        token_in: String,
        #[arg(long)]
        token_out: String,
        #[arg(long)]
        amount: f64,
    },
    /// 铸造测试代币
    Mint {
        #[arg(long)]
        user: String,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        amount: f64,
    },
    /// 代币转账
    Transfer {
        #[arg(long)]
        user: String,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 加载环境变量
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::from_file(&cli.config)?);
    init_logger(&config.logging)?;

    log::info!(
        "加载配置: {} (网络 {}, 日志级别 {})",
        cli.config,
        config.network.active,
        config.logging.level
    );

    let store = Arc::new(JsonWalletStore::new(config.wallet_store.path.clone()));
    let keys = CustodyKeys::from_env(&config.custody.api_key_env)?;
    let mut deps = StrategyDeps::builder()
        .with_wallet_store(store.clone())
        .with_yield_oracle(Arc::new(HttpYieldOracle::new(&config.yield_oracle)?))
        .with_chain_reader(Arc::new(JsonRpcChainReader::new(&config.chain)?))
        .with_custody(Arc::new(HttpCustodyClient::new(&config.custody, keys)?));

    if let Some(notifications) = config.notifications.clone() {
        if notifications.enabled {
            deps = deps.with_notifier(Arc::new(WebhookNotifier::new(notifications)?));
            log::info!("✅ Webhook通知已启用");
        }
    }

    let strategy = RebalanceStrategy::create(config.clone(), deps.build()?)?;
    let manual = || {
        ManualOperations::new(
            strategy.runner().orchestrator().clone(),
            store.clone(),
            config.chain.amount_decimals,
        )
    };

    match cli.command {
        Command::Run => {
            if !config.strategy.enabled {
                log::warn!("⚠️ 策略 {} 未启用，退出", config.strategy.name);
                return Ok(());
            }

            strategy.start().await?;
            log::info!("调仓策略已启动，等待周期触发...");

            // 保持运行直到收到停止信号
            tokio::signal::ctrl_c().await?;
            log::info!("收到停止信号，正在关闭策略...");
            strategy.stop().await?;
        }
        Command::Once => {
            if let Some(report) = strategy.trigger().await {
                println!("{}", serde_json::to_string_pretty(&report)?);
                if report.has_failures() {
                    log::warn!("⚠️ 本周期存在失败: {}", report.summary());
                }
            }
        }
        Command::Plan => {
            let plans = strategy.runner().plan_cycle().await?;
            let network = strategy.runner().orchestrator().network().clone();
            if plans.is_empty() {
                println!("无需调仓");
            }
            for plan in plans {
                println!(
                    "{}: {:.6} {} -> {}{}",
                    plan.owner,
                    plan.amount,
                    network.describe_protocol(&plan.from_protocol),
                    network.describe_protocol(&plan.to_protocol),
                    if plan.requires_swap() {
                        format!(" (兑换为 {})", network.describe_token(&plan.token_out))
                    } else {
                        String::new()
                    }
                );
            }
        }
        Command::Stake {
            user,
            asset,
            protocol,
            amount,
        } => {
            let hash = manual()
                .stake(
                    &Address::parse(&user)?,
                    asset.parse::<Asset>()?,
                    protocol.parse::<Protocol>()?,
                    amount,
                )
                .await?;
            println!("{}", hash);
        }
        Command::Unstake { user, protocol } => {
            let hash = manual()
                .unstake(&Address::parse(&user)?, protocol.parse::<Protocol>()?)
                .await?;
            println!("{}", hash);
        }
        Command::Swap {
            user,
            token_in,
            token_out,
            amount,
        } => {
            let hash = manual()
                .swap(
                    &Address::parse(&user)?,
                    token_in.parse::<Asset>()?,
                    token_out.parse::<Asset>()?,
                    amount,
                )
                .await?;
            println!("{}", hash);
        }
        Command::Mint {
            user,
            asset,
            amount,
        } => {
            let hash = manual()
                .mint(&Address::parse(&user)?, asset.parse::<Asset>()?, amount)
                .await?;
            println!("{}", hash);
        }
        Command::Transfer {
            user,
            asset,
            to,
            amount,
        } => {
            let hash = manual()
                .transfer(
                    &Address::parse(&user)?,
                    asset.parse::<Asset>()?,
                    &Address::parse(&to)?,
                    amount,
                )
                .await?;
            println!("{}", hash);
        }
    }

    Ok(())
}

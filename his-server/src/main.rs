//! HIS服务器主程序

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use his_admin::{init_tracing, ConfigManager, DatabaseBackend, HisConfig};
use his_database::{DatabasePool, DatabaseQueries, MemoryRepository, PgRepository};
use his_exposure::ExposureTracer;
use his_web::{AppState, CorsSettings, WebServer};
use tracing::{error, info};

/// HIS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "his-server")]
#[command(about = "HIS (Hospital Information System) 服务器，含MDR接触者追踪")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址，覆盖配置文件
    #[arg(long)]
    host: Option<String>,

    /// 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别，覆盖配置文件和 RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,

    /// 使用内存存储（数据不持久化）
    #[arg(long)]
    in_memory: bool,

    /// 打印生效配置后退出
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut manager = ConfigManager::load(args.config.as_deref())?;
    manager.apply_overrides(|config| {
        if let Some(host) = &args.host {
            config.server.host = host.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if args.in_memory {
            config.database.backend = DatabaseBackend::Memory;
        }
    })?;

    if args.print_config {
        println!("{}", manager.to_toml()?);
        return Ok(());
    }

    let config = manager.into_config();

    // 初始化日志
    init_tracing(&config.logging, args.log_level.as_deref())?;

    info!("启动HIS服务器...");

    if let Err(e) = run(config).await {
        error!("服务器启动失败: {:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(config: HisConfig) -> Result<()> {
    let tracer = ExposureTracer::new(config.exposure.weights(), config.exposure.default_window_days);

    let state = match config.database.backend {
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; data will be lost on exit");
            AppState::new(Arc::new(MemoryRepository::new()), tracer)
        }
        DatabaseBackend::Postgres => {
            let pool = DatabasePool::connect(
                &config.database.url,
                config.database.max_connections,
                config.database.connect_timeout(),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            DatabaseQueries::new(&pool)
                .create_tables()
                .await
                .context("Failed to prepare database schema")?;
            AppState::new(Arc::new(PgRepository::new(pool)), tracer)
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    info!("HIS服务器配置:");
    info!("  监听地址: {}", addr);
    info!("  存储后端: {:?}", config.database.backend);
    info!("  默认追溯天数: {}", config.exposure.default_window_days);

    let cors = CorsSettings {
        enabled: config.web.enable_cors,
        allowed_origins: config.web.cors_allowed_origins.clone(),
    };
    WebServer::new(addr, state, &cors).run().await
}

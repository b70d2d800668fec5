//! disbursement-core 主入口
//! 加载配置、连接数据库，按固定间隔驱动锚点平台对账

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use disbursement_core::{
    app_state::AppState,
    config::Config,
    infrastructure::{
        db::{init_pool, PoolConfig},
        logging::init_logging,
    },
};
use tokio::time::MissedTickBehavior;

#[tokio::main]
async fn main() -> Result<()> {
    // ✅ 1. 加载环境变量
    dotenvy::dotenv().ok();

    // ✅ 2. 加载配置（CONFIG_PATH 指向的文件优先）
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // ✅ 3. 初始化日志
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("🚀 Starting disbursement core");

    // ✅ 4. 连接数据库
    let pool_config = PoolConfig::from(&config.database);
    let pool = init_pool(&config.database.url, &pool_config)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("✅ Database connected");

    // ✅ 5. 管理库迁移（租户 schema 由开通流程负责）
    if std::env::var("SKIP_MIGRATIONS").is_err() {
        sqlx::migrate!("./migrations/admin")
            .run(&pool)
            .await
            .context("Failed to run admin migrations")?;
        tracing::info!("✅ Database migrations completed");
    } else {
        tracing::info!("⏭️ Database migrations skipped (SKIP_MIGRATIONS=1)");
    }

    // ✅ 6. 初始化应用状态
    let state = Arc::new(AppState::new(pool, Arc::new(config))?);
    tracing::info!(
        account_types = ?state.signer_router.supported_account_types(),
        "✅ Signer router initialized"
    );

    // ✅ 7. 对账循环：单个任务顺序执行，保证不会有两次运行重叠
    let interval_secs = state.config.reconciliation.interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match state.reconciliation.patch_all_tenants(state.tenants.as_ref()).await {
                    Ok(report) => tracing::info!(
                        candidates = report.candidates,
                        patched = report.patched,
                        failed = report.failed,
                        "reconciliation round finished"
                    ),
                    Err(e) => tracing::error!("❌ reconciliation round failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    state.tenant_router.close_all().await;
    tracing::info!("👋 Shutdown complete");
    Ok(())
}

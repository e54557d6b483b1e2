use hedger::HedgeSession;
use hedger_core::{ConfigLoader, OptionKind};

const CONFIG: &str = r#"
[hedge]
band_fraction = 0.05
min_band = 0.5
lot_size = 1
max_trade_units = 50
tick_interval_secs = 60

[feed]
initial_price = 1.2
volatility = 0.10
seed = 17

[[instruments]]
id = "EURUSD"

[[positions]]
instrument = "EURUSD"
kind = "CALL"
strike = 1.2
time_to_expiry = 0.25
premium = 0.02
multiplier = 1000
quantity = -2
"#;

fn write_config(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("delta-hedger-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("Config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

#[tokio::test]
async fn test_simulated_session_from_config() {
    let path = write_config("session");
    let config = ConfigLoader::load_from(&path).expect("Failed to load config");
    assert_eq!(config.positions.len(), 1);
    assert_eq!(config.positions[0].kind, OptionKind::Call);

    let mut session = HedgeSession::from_config(&config).expect("Failed to build session");
    for _ in 0..20 {
        session.run_hedge_tick().await.expect("Hedge tick failed");
    }

    let report = session.report();
    assert_eq!(report.short_positions.len(), 1);
    assert!(report.hedge_trades > 0);
    // Short calls are hedged by buying the underlying
    let inst = &report.instruments[0];
    assert!(inst.hedge_units > rust_decimal::Decimal::ZERO);
    assert!(inst.net_exposure.abs() <= inst.band.unwrap());
    assert!(serde_json::to_string(&report).is_ok());
}

#[tokio::test]
async fn test_same_config_same_report() {
    let path = write_config("replay");
    let config = ConfigLoader::load_from(&path).unwrap();

    let mut a = HedgeSession::from_config(&config).unwrap();
    let mut b = HedgeSession::from_config(&config).unwrap();
    for _ in 0..10 {
        a.run_hedge_tick().await.unwrap();
        b.run_hedge_tick().await.unwrap();
    }

    let (ra, rb) = (a.report(), b.report());
    assert_eq!(ra.hedge_trades, rb.hedge_trades);
    assert_eq!(ra.instruments[0].hedge_units, rb.instruments[0].hedge_units);
    assert_eq!(ra.instruments[0].spot, rb.instruments[0].spot);
}

// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    // Payment gateway credentials
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    pub gateway_base_url: String,
    pub webhook_secret: String,
    // Device push credentials
    pub push_server_key: String,
    pub push_endpoint: String,
    // Flow tuning
    pub max_revisions: i32,
    pub reconcile_after_secs: i64,
    pub escrow_quiescence_days: i64,
    pub transition_timeout_secs: u64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");
        let redis_url = std::env::var("REDIS_URL").ok();

        // Payment gateway configuration (with test defaults)
        let gateway_key_id = std::env::var("GATEWAY_KEY_ID")
            .unwrap_or_else(|_| "test_key_id".to_string());
        let gateway_key_secret = std::env::var("GATEWAY_KEY_SECRET")
            .unwrap_or_else(|_| "test_key_secret".to_string());
        let gateway_base_url = std::env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());
        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .unwrap_or_else(|_| "test_webhook_secret".to_string());

        // Push configuration (with defaults)
        let push_server_key = std::env::var("PUSH_SERVER_KEY")
            .unwrap_or_else(|_| "".to_string());
        let push_endpoint = std::env::var("PUSH_ENDPOINT")
            .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string());

        let max_revisions = std::env::var("MAX_REVISIONS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(3)
            .clamp(1, 10);
        let reconcile_after_secs = std::env::var("RECONCILE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(600);
        let escrow_quiescence_days = std::env::var("ESCROW_QUIESCENCE_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);

        Config {
            database_url,
            redis_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8000),
            gateway_key_id,
            gateway_key_secret,
            gateway_base_url,
            webhook_secret,
            push_server_key,
            push_endpoint,
            max_revisions,
            reconcile_after_secs,
            escrow_quiescence_days,
            transition_timeout_secs: 15,
        }
    }
}

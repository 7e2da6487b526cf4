use crate::commands::{with_migrated_pool, CommandResult};
use procura_db::{DemoSeedDataset, RequestSeedInfo};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |pool| async move {
        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            let message = if failed_checks.is_empty() {
                "Some seed data failed to load".to_string()
            } else {
                format!("Seed verification failed for checks: {}", failed_checks.join(", "))
            };
            return Err(("seed_verification", message, 6u8));
        }

        Ok(seed_result.requests_seeded)
    });

    match result {
        Ok(requests) => CommandResult::success("seed", render_summary(&requests)),
        Err(failure) => failure,
    }
}

fn render_summary(requests: &[RequestSeedInfo]) -> String {
    let request_descriptions: Vec<String> = requests
        .iter()
        .map(|r| format!("  - {} [{}]: {}", r.request_id, r.status, r.description))
        .collect();
    format!(
        "demo dataset loaded, one request per lifecycle stage:\n{}",
        request_descriptions.join("\n")
    )
}

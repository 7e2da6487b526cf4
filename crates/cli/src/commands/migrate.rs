use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    // Migration itself happens inside the shared plumbing; the body only
    // confirms the pool came up against a fully migrated schema.
    match with_migrated_pool("migrate", |_pool| async move { Ok(()) }) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}

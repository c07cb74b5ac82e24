use std::time::Duration;

use tokio::sync::watch;

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `true` if the full duration elapsed, `false` on shutdown. A
/// dropped sender means shutdown can no longer be signalled; the wait then
/// simply runs to completion.
pub async fn wait_unless_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    sleep.as_mut().await;
                    return true;
                }
                // Re-check the value at the top of the loop.
            }

            _ = &mut sleep => return true,
        }
    }
}

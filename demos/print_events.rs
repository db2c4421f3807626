use futures::{future, StreamExt};
use inputwatch::{find_keyboards, monitor_all, InputWatchError};

#[tokio::main]
async fn main() -> Result<(), InputWatchError> {
    tracing_subscriber::fmt::init();

    let keyboards = find_keyboards()?;
    for kb in &keyboards {
        println!("found {} @ {}", kb.display_name(), kb.input_path().display());
    }

    let mut session = monitor_all(Some(keyboards))?;
    let queues = session.take_queues().into_iter().map(|(path, mut queue)| async move {
        while let Some(ev) = queue.next().await {
            println!("[{} @ {:?}]: ev={ev:?}", path.display(), ev.timestamp());
        }
    });

    future::join_all(queues).await;

    for report in session.shutdown().await {
        println!("{}: {:?}", report.path.display(), report.reason);
    }

    Ok(())
}

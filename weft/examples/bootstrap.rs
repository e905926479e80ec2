//! Starts a runtime by hand and runs a small echo exchange over a socket
//! pair while a timer ticks next to it.
//!
//! ```sh
//! cargo run --example bootstrap
//! ```

use std::os::unix::net::UnixStream;
use std::time::Duration;

use weft::io::Async;
use weft::runtime::{Builder, ConfigError};
use weft::task::JoinSet;
use weft::time::{sleep, timeout};

async fn run() -> std::io::Result<()> {
    let (client, server) = UnixStream::pair()?;
    let client = Async::new(client)?;
    let server = Async::new(server)?;

    let echo = weft::spawn(async move {
        let mut buf = [0; 64];
        let n = server.read(&mut buf).await?;
        server.write_all(&buf[..n]).await?;
        Ok::<_, std::io::Error>(n)
    });

    let mut ticks = JoinSet::new();
    for i in 1..=3u64 {
        ticks.spawn(async move {
            sleep(Duration::from_millis(10 * i)).await;
            i
        });
    }

    client.write_all(b"hello weft").await?;
    let mut reply = [0; 64];
    let n = timeout(Duration::from_secs(1), client.read(&mut reply))
        .await
        .map_err(std::io::Error::other)??;
    println!("echoed: {}", String::from_utf8_lossy(&reply[..n]));

    match echo.await {
        Ok(result) => println!("server handled {} bytes", result?),
        Err(err) => println!("echo task failed: {err}"),
    }

    while let Some(tick) = ticks.join_next().await {
        match tick {
            Ok(i) => println!("tick {i}"),
            Err(err) => println!("tick failed: {err}"),
        }
    }

    Ok(())
}

fn main() -> Result<(), ConfigError> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("demo")
        .build()?;

    if let Err(err) = runtime.block_on(run()) {
        eprintln!("demo failed: {err}");
    }

    runtime.shutdown();
    Ok(())
}

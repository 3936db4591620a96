//! Echo - request/response over a named pipe.
//!
//! This example demonstrates:
//! - Starting a server with a router and waiting for one peer
//! - Connecting a client and sending a request with a JSON body
//! - Reading the response body back
//!
//! # Running
//!
//! ```text
//! cargo run --example echo -- serve /tmp/echo.sock
//! cargo run --example echo -- send /tmp/echo.sock hello
//! ```

use serde::{Deserialize, Serialize};
use streamwire::{
    handler_fn, Client, ReceiveRequest, RequestRouter, Server, StreamingRequest,
    StreamingResponse,
};

/// Body of the echo request.
#[derive(Serialize, Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Body of the echo response.
#[derive(Serialize, Deserialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [mode, path] if mode == "serve" => serve(path).await,
        [mode, path, message] if mode == "send" => send(path, message).await,
        _ => {
            eprintln!("usage: echo serve <path> | echo send <path> <message>");
            Ok(())
        }
    }
}

async fn serve(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut router = RequestRouter::new();
    router.register(
        "POST",
        "/echo",
        handler_fn(|request: ReceiveRequest| async move {
            let input: EchoInput = match request.body() {
                Some(body) => body.read_as_json().await?,
                None => return Ok(StreamingResponse::new(400)),
            };
            let mut response = StreamingResponse::ok();
            response.set_body_json(&EchoOutput {
                echo: input.message,
            })?;
            Ok::<_, streamwire::StreamingError>(response)
        }),
    );

    let server = Server::builder().handler(router).start_pipe(path).await?;

    // Wait for shutdown (peer closes the pipe)
    server.wait_for_shutdown().await?;
    Ok(())
}

async fn send(path: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder().connect_pipe(path).await?;

    let mut request = StreamingRequest::post("/echo");
    request.set_body_json(&EchoInput {
        message: message.to_string(),
    })?;
    let response = client.send(request).await?;

    match response.body() {
        Some(body) => {
            let output: EchoOutput = body.read_as_json().await?;
            println!("{} {}", response.status_code, output.echo);
        }
        None => println!("{}", response.status_code),
    }

    client.disconnect().await;
    Ok(())
}

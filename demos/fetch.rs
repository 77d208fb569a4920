use std::sync::{Arc, Mutex};

use authsession_http::{
    ReqwestTransport, RequestClient, RequestOptions, SessionCookieJar, SessionOptions,
    TransportOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("AUTHSESSION_URL")?;
    let username = std::env::var("AUTHSESSION_USERNAME").unwrap_or_default();
    let password = std::env::var("AUTHSESSION_PASSWORD").unwrap_or_default();

    let options = TransportOptions::from_env().map_err(anyhow::Error::msg)?;
    let transport = ReqwestTransport::with_cookie_jar(Arc::new(SessionCookieJar::new()), options)?;

    let outcome = Arc::new(Mutex::new(None));
    let on_success = Arc::clone(&outcome);
    let on_error = Arc::clone(&outcome);
    let request = RequestOptions::new(url)
        .credentials(username, password)
        .on_success(move |response| {
            *on_success.lock().unwrap() = Some(Ok(response));
        })
        .on_error(move |err| {
            *on_error.lock().unwrap() = Some(Err(err));
        });

    RequestClient::new(
        request,
        SessionOptions::with_session_cookie("JSESSIONID"),
        &transport,
        transport.cookie_jar().as_ref(),
    )?
    .send()
    .await;

    let outcome = outcome.lock().unwrap().take();
    match outcome {
        Some(Ok(response)) => println!("{} {:?}", response.raw.status, response.body),
        Some(Err(err)) => eprintln!("request failed: {err}"),
        None => eprintln!("no outcome delivered"),
    }

    Ok(())
}

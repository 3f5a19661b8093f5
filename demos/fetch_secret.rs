//! Fetches secrets from a mock PAM API with one shared client, showing that the bearer token
//! is acquired once and reused across threads.

// std
use std::thread;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use tracing_subscriber::EnvFilter;
use url::Url;
// self
use pam_secrets_client::{
	client::PamClient,
	config::{ClientConfig, Credentials},
};

fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
		)
		.init();

	let server = MockServer::start();
	let token_mock = server.mock(|when, then| {
		when.method(POST).path("/Auth/connect/token");
		then.status(200).header("content-type", "application/json").body(
			"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
		);
	});
	let secret_mock = server.mock(|when, then| {
		when.method(GET).path("/Secrets/db-password").header("authorization", "Bearer demo-access");
		then.status(200).header("content-type", "application/json").body(
			"{\"Id\":\"db-password\",\"Title\":\"Database\",\"Username\":\"svc\",\"Password\":\"hunter2\"}",
		);
	});
	let credentials =
		Credentials::new("demo-client", "super-secret", Url::parse(&server.base_url())?);
	let client = PamClient::new(ClientConfig::new(credentials).allow_insecure_http(true))?;

	thread::scope(|scope| -> Result<()> {
		let shared = &client;
		let workers = (0..4)
			.map(|_| scope.spawn(move || shared.get_secret("db-password")))
			.collect::<Vec<_>>();

		for worker in workers {
			let secret = worker.join().map_err(|_| color_eyre::eyre::eyre!("Worker panicked."))??;

			println!("Fetched `{}` for user {:?}.", secret.title, secret.username);
		}

		Ok(())
	})?;

	println!("Token status after fetches: {}.", client.token_cache().status());
	println!("Token endpoint calls: {}.", token_mock.calls());
	println!("Secret endpoint calls: {}.", secret_mock.calls());

	client.close();

	Ok(())
}

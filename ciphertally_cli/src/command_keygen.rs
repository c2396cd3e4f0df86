use ciphertally::Principal;

pub fn command_keygen(_matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let (secret, public) = ciphertally::generate_keypair();
    let principal = Principal::from(&public);
    let (secret, public) = (
        hex::encode(secret.to_bytes()),
        hex::encode(public.to_bytes()),
    );

    println!("secret-key: {}", secret);
    println!("public-key: {}", public);
    println!("principal:  {}", principal);
    Ok(())
}

#[rocket::launch]
fn rocket() -> _ {
    let rocket = unibox_server::rocket();
    log::info!("Starting Unibox API Server");
    rocket
}

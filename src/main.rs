use rocket::launch;

#[launch]
fn rocket() -> _ {
    let rocket = marketplace_api::rocket();
    log::info!("Starting Marketplace API Server");
    rocket
}

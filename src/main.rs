#[actix_web::main]
async fn main() -> std::io::Result<()> {
    product_selection_server::run().await
}

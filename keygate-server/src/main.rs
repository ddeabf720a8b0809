use app::App;
use keygate_server::app;
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    App::new().run().await
}

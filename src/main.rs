fn main() -> std::io::Result<()> {
    geocode_gateway::run()
}

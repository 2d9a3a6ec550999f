fn main() -> coinkeeper_node::Result<()> {
    coinkeeper_node::run()
}

use namespace_lexicon_spec::compile::LexiconBuild;

fn main() {
	LexiconBuild::from_env().compile("assets/blockchain.toml");
}

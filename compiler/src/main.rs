//! Yomidic 辞書コンパイラのメインエントリーポイント
//!
//! このモジュールは、TSV形式のテキスト辞書からバイナリ形式の
//! システム辞書を構築するCLIツールを提供します。

use std::fs::File;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use yomidic::dictionary::{BuilderConfig, SystemDictionaryBuilder};
use yomidic::errors::YomidicError;
use yomidic::loader::TextDictionaryLoader;

/// コマンドライン引数の構造体
///
/// システム辞書をビルドするために必要な入力ファイルと出力先を指定します。
#[derive(Parser, Debug)]
#[clap(
    name = "compile",
    version,
    about = "A program to build the system dictionary."
)]
struct Args {
    /// System lexicon file in TSV (key, left id, right id, cost, value).
    #[clap(short = 'l', long)]
    lexicon_in: PathBuf,

    /// File to which the binary dictionary is output.
    #[clap(short = 'o', long)]
    dic_out: PathBuf,

    /// Also write each section to <dic-out>.{value,key,tokens,freq_pos}.
    #[clap(long)]
    preserve_intermediate_dictionary: bool,

    /// Minimum key length to use the one-byte cost encoding.
    #[clap(long, default_value_t = 6)]
    min_key_length_to_use_small_cost_encoding: usize,
}

/// コンパイラの実行中に発生する可能性のあるエラー
#[derive(Debug, Error)]
pub enum CompileError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 辞書構築エラー
    #[error("Dictionary building failed: {0}")]
    Yomidic(#[from] YomidicError),
}

/// メイン関数
///
/// コマンドライン引数をパースし、テキスト辞書の読み込み、辞書の構築、
/// イメージの書き出しを順に実行します。
///
/// # エラー
///
/// 読み込み・構築・書き出しのいずれかに失敗した場合、対応する
/// `CompileError`を返します。
fn main() -> Result<(), CompileError> {
    let args = Args::parse();

    println!("Loading the lexicon...");
    let tokens = TextDictionaryLoader::from_reader(File::open(&args.lexicon_in)?)?;
    println!("{} tokens loaded", tokens.len());

    let config = BuilderConfig {
        preserve_intermediate_dictionary: args.preserve_intermediate_dictionary,
        min_key_length_to_use_small_cost_encoding: args
            .min_key_length_to_use_small_cost_encoding,
    };

    println!("Compiling the system dictionary...");
    let mut builder = SystemDictionaryBuilder::new(config);
    builder.build_from_tokens(&tokens)?;

    println!("Writing the system dictionary...");
    builder.write_to_file(&args.dic_out)?;

    println!(
        "Successfully built the dictionary to {}",
        args.dic_out.display()
    );
    Ok(())
}

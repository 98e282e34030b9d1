use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info};

use ubidump::present::listing_line;
use ubidump::ubifs::node::DIRENT_ALL_TYPES;
use ubidump::{UbiBlocks, UbiFs};

/// List and extract files from UBI images and the UBIFS filesystems inside
/// them.
#[derive(Parser, Debug)]
#[command(name = "ubidump", about = "UBI/UBIFS dumper")]
struct Cli {
    /// Save files in all volumes to the specified directory.
    #[arg(short, long, value_name = "DIRECTORY")]
    savedir: Option<PathBuf>,

    /// Extract a single file to stdout.
    #[arg(short, long, value_name = "FILE")]
    cat: Option<String>,

    /// List directory contents.
    #[arg(short, long)]
    listfiles: bool,

    /// Dump the filesystem b-tree contents.
    #[arg(short, long)]
    dumptree: bool,

    /// Print extra info.
    #[arg(short, long)]
    verbose: bool,

    /// UBI images to process.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    for path in &cli.files {
        println!("==> {} <==", path.display());
        if let Err(e) = process_file(path, &cli) {
            error!("{path:?}: {e}");
            println!("ERROR {e}");
        }
    }
}

fn process_file(path: &Path, cli: &Cli) -> ubidump::Result<()> {
    let mut blocks = UbiBlocks::open(path)?;

    if cli.verbose {
        println!("===== block =====");
        println!(
            "{} named volumes found, {} physical volumes, blocksize={:#x}",
            blocks.num_volumes(),
            blocks.physical_volume_ids().count(),
            blocks.leb_size()
        );
    }

    let data_ofs = blocks.data_ofs();
    let vol_ids: Vec<u32> = {
        let mut ids: Vec<u32> = blocks.volumes().map(|(id, _)| id).collect();
        ids.sort();
        ids
    };

    for vol_id in vol_ids {
        let name = blocks
            .vtbl_record(vol_id)
            .map(|rec| String::from_utf8_lossy(&rec.name()).into_owned())
            .unwrap_or_default();
        println!("== volume {name} ==");

        let mut fs = match UbiFs::load(&mut blocks, vol_id, data_ofs) {
            Ok(fs) => fs,
            Err(e) => {
                error!("volume {name}: failed to load filesystem: {e}");
                continue;
            }
        };

        if cli.verbose {
            info!("superblock: {:?}", fs.superblock());
            info!("master: {:?}", fs.master());
        }

        if cli.dumptree {
            dump_tree(&mut fs)?;
        }

        if let Some(savedir) = &cli.savedir {
            let count = save_all(&mut fs, savedir, &name)?;
            println!("saved {count} files");
        }

        if cli.listfiles {
            list_files(&mut fs)?;
        }

        if let Some(cat_path) = &cli.cat {
            cat_file(&mut fs, cat_path)?;
        }
    }

    Ok(())
}

fn split_path(path: &str) -> Vec<Vec<u8>> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .map(|p| p.as_bytes().to_vec())
        .collect()
}

fn dump_tree(fs: &mut UbiFs<'_>) -> ubidump::Result<()> {
    // A breadth-unaware recursive dump of every reachable node, following
    // index branches down to the leaves. Read errors on a branch are
    // reported but do not abort the rest of the dump.
    fn recurse(fs: &mut UbiFs<'_>, lnum: u32, offs: u32, depth: usize) {
        match fs.read_node(lnum, offs) {
            Ok(ubidump::ubifs::Node::Index(idx)) => {
                println!("{:indent$}[{lnum:2}:{offs:#07x}] INDEX nchild={} level={}", "", idx.child_cnt, idx.level, indent = depth * 2);
                for b in idx.branches.clone() {
                    recurse(fs, b.lnum, b.offs, depth + 1);
                }
            }
            Ok(node) => {
                println!("{:indent$}{node:?}", "", indent = depth * 2);
            }
            Err(e) => {
                println!("{:indent$}ERROR {e}", "", indent = depth * 2);
            }
        }
    }

    let root = fs.root().clone();
    println!("[root] INDEX nchild={} level={}", root.child_cnt, root.level);
    for b in root.branches {
        recurse(fs, b.lnum, b.offs, 1);
    }
    Ok(())
}

fn save_all(fs: &mut UbiFs<'_>, savedir: &Path, vol_name: &str) -> ubidump::Result<usize> {
    let entries = fs.walk(1, &[], 1 << ubidump::ubifs::node::DirEntryType::Regular as u32)?;
    let mut count = 0;
    for (inum, path) in entries {
        let mut dest = savedir.join(vol_name);
        for component in &path {
            dest.push(String::from_utf8_lossy(component).into_owned());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&dest)?;
        fs.save_file(inum, &mut file)?;
        count += 1;
    }
    Ok(count)
}

fn list_files(fs: &mut UbiFs<'_>) -> ubidump::Result<()> {
    let entries = fs.walk(1, &[], DIRENT_ALL_TYPES)?;
    for (inum, path) in entries {
        let inode = fs.inode(inum)?;
        println!("{}", listing_line(&inode, &path));
    }
    Ok(())
}

fn cat_file(fs: &mut UbiFs<'_>, cat_path: &str) -> ubidump::Result<()> {
    let components = split_path(cat_path);
    match fs.find_path(&components, 1)? {
        Some(inum) => {
            let mut stdout = std::io::Cursor::new(Vec::new());
            fs.save_file(inum, &mut stdout)?;
            use std::io::Write;
            std::io::stdout().write_all(stdout.get_ref())?;
        }
        None => {
            error!("file not found: {cat_path}");
        }
    }
    Ok(())
}

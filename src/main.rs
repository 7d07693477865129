// Command line front end for HySDS package management.
#[macro_use]
extern crate log;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use sdspkg::config::{self, Settings};
use sdspkg::{
    list_packages, Catalogs, ElasticCatalog, Error, Exporter, Importer, ObjectStoreRouter,
    Remover, Result,
};

const USAGE: &str = "
Manage HySDS packages (container + job specs + hysds_ios).

Usage:
    sdspkg [options] ls
    sdspkg [options] export <id> <outdir> [--accounts]
    sdspkg [options] import <file>
    sdspkg [options] rm <id>
    sdspkg (-h | --help)

Options:
    -h --help            Show this screen.
    -c --config FILE     SDS settings file (default ~/.sds/config).
    -d --debug           Log at debug level.
    --accounts           Export allowed_accounts of hysds_ios as well.
";

#[derive(Deserialize, Debug)]
struct Args {
    cmd_ls: bool,
    cmd_export: bool,
    cmd_import: bool,
    cmd_rm: bool,
    arg_id: String,
    arg_outdir: String,
    arg_file: String,
    flag_config: Option<String>,
    flag_debug: bool,
    flag_accounts: bool,
}

struct Clients {
    mozart: ElasticCatalog,
    grq: ElasticCatalog,
    objects: ObjectStoreRouter,
}

impl Clients {
    fn new(settings: &Settings) -> Result<Clients> {
        Ok(Clients {
            mozart: ElasticCatalog::new(&settings.mozart_es_url())?,
            grq: ElasticCatalog::new(&settings.grq_es_url())?,
            objects: ObjectStoreRouter::new(settings.s3_endpoint_url.clone()),
        })
    }

    fn catalogs(&self) -> Catalogs<'_> {
        Catalogs::new(&self.mozart, &self.grq)
    }
}

fn run(args: &Args) -> Result<()> {
    let settings_path = match &args.flag_config {
        Some(path) => PathBuf::from(path),
        None => config::default_path()?,
    };
    let settings = Settings::load(&settings_path)?;
    let clients = Clients::new(&settings)?;

    if args.cmd_ls {
        for id in list_packages(&clients.mozart)? {
            println!("{}", id);
        }
    } else if args.cmd_export {
        let summary = Exporter::new(clients.catalogs(), &clients.objects)
            .keep_accounts(args.flag_accounts)
            .export(&args.arg_id, Path::new(&args.arg_outdir))?;
        info!(
            "exported {} job specs, {} hysds_ios, {} dependency images",
            summary.job_specs, summary.hysds_ios, summary.dependency_images
        );
        println!("{} {}", summary.archive.path.display(), summary.archive.digest);
    } else if args.cmd_import {
        let destination = settings.code_bucket_url()?;
        let summary = Importer::new(clients.catalogs(), &clients.objects, destination)
            .import(Path::new(&args.arg_file))?;
        info!(
            "imported {}: {} job specs, {} hysds_ios, {} blobs",
            summary.container_id, summary.job_specs, summary.hysds_ios, summary.blobs_uploaded
        );
    } else if args.cmd_rm {
        Remover::new(clients.catalogs(), &clients.objects).remove(&args.arg_id)?;
    }
    Ok(())
}

fn exit_code(e: &Error) -> i32 {
    if e.is_handled() {
        1
    } else {
        2
    }
}

fn main() {
    let args: Args = docopt::Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let default_filter = if args.flag_debug {
        "warn,sdspkg=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(exit_code(&e));
    }
}

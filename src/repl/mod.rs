use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bully::{NodeId, NodeStatus};
use crate::cluster::LocalCluster;

const HELP: &str = "\
Commands:
  status        show every node's view of the group
  kill N        stop node N from answering
  revive N      bring node N back and let it rejoin
  ping N        make node N ping its leader
  add           start a new node with the next id
  count         outbound messages since the last reset
  reset         zero the message counters
  help          this text
  exit          quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Kill(NodeId),
    Revive(NodeId),
    Ping(NodeId),
    Add,
    Count,
    Reset,
    Help,
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .map(|w| w.to_ascii_lowercase())
            .unwrap_or_default();
        let arg = words.next();

        let node_arg = |name: &str| -> Result<NodeId, String> {
            arg.ok_or_else(|| format!("usage: {name} N"))?
                .parse::<NodeId>()
                .map_err(|e| format!("invalid node id: {e}"))
        };

        match verb.as_str() {
            "status" | "s" => Ok(Command::Status),
            "kill" | "k" => node_arg("kill").map(Command::Kill),
            "revive" | "r" => node_arg("revive").map(Command::Revive),
            "ping" | "p" => node_arg("ping").map(Command::Ping),
            "add" => Ok(Command::Add),
            "count" => Ok(Command::Count),
            "reset" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            other => Err(format!("unknown command '{other}', try 'help'")),
        }
    }
}

pub struct Repl {
    cluster: LocalCluster,
    rl: DefaultEditor,
}

impl Repl {
    pub fn new(cluster: LocalCluster) -> rustyline::Result<Self> {
        Ok(Self {
            cluster,
            rl: DefaultEditor::new()?,
        })
    }

    pub async fn run(&mut self) {
        println!("Bully election cluster with {} node(s)", self.cluster.len());
        println!("Type 'help' for commands or 'exit' to quit");

        loop {
            match self.rl.readline("bully> ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = self.rl.add_history_entry(line.as_str());

                    match Command::parse(&line) {
                        Ok(Command::Exit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(cmd) => self.execute(cmd).await,
                        Err(e) => eprintln!("{e}"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }
    }

    async fn execute(&mut self, cmd: Command) {
        let result = match cmd {
            Command::Status => {
                print_status(&self.cluster.summary().await);
                Ok(())
            }
            Command::Kill(id) => self.cluster.kill(id).map(|_| println!("Node {id} killed")),
            Command::Revive(id) => self
                .cluster
                .revive(id)
                .await
                .map(|outcome| println!("Node {id} revived (election: {outcome:?})")),
            Command::Ping(id) => self.cluster.ping_leader(id).await.map(|outcome| match outcome {
                Some(outcome) => println!("Node {id} lost its leader (election: {outcome:?})"),
                None => println!("Node {id} reached its leader"),
            }),
            Command::Add => self
                .cluster
                .add_node()
                .await
                .map(|id| println!("Node {id} joined")),
            Command::Count => {
                println!("{} message(s) sent", self.cluster.message_count());
                Ok(())
            }
            Command::Reset => {
                self.cluster.reset_message_counts();
                println!("Message counters reset");
                Ok(())
            }
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Exit => Ok(()),
        };

        if let Err(e) = result {
            eprintln!("Error: {e:#}");
        }
    }
}

fn print_status(nodes: &[NodeStatus]) {
    let width = 12;
    for col in ["node", "alive", "ready", "role", "leader", "peers"] {
        print!("{col:width$}");
    }
    println!();
    println!("{}", "-".repeat(width * 6));

    for n in nodes {
        let leader = n
            .leader_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let role = format!("{:?}", n.role);
        print!("{:width$}", n.id);
        print!("{:width$}", n.alive);
        print!("{:width$}", n.ready);
        print!("{role:width$}");
        print!("{leader:width$}");
        println!("{}", n.peers.len());
    }
}

// Copyright 2020 - present Rex Calloway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use engine::Engine;

fn main() {
    simple_logger::SimpleLogger::new().init().expect("logger already initialized");

    let mut engine = Engine::default();
    engine
        .execute("CREATE TABLE simple_table (int_column INT);")
        .and_then(|_| engine.execute("INSERT INTO simple_table VALUES (1);"))
        .and_then(|_| engine.execute("SELECT int_column FROM simple_table WHERE int_column = 1;"))
        .map(|result| println!("{:?}", result))
        .unwrap_or_else(|e| eprintln!("Something went wrong: {}", e));
}

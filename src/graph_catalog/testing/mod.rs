//! Test utilities: a movie-domain schema covering every schema feature the
//! compiler handles (aliases, computed fields, relationship properties,
//! interfaces, unions, limits and authorization rules).

use super::config::GraphSchemaConfig;
use super::graph_schema::GraphSchema;

pub const MOVIE_SCHEMA_YAML: &str = r#"
enums: [Genre]
entities:
  Movie:
    attributes:
      id: { type: ID, unique: true, nullable: false }
      title: { type: String, nullable: false }
      tagline: { type: String, alias: tag_line }
      released: { type: Int }
      premiere: { type: DateTime }
      genre: { type: Genre }
      tags: { type: "[String]" }
      actorCount:
        type: Int
        computed:
          statement: "MATCH (this)<-[:ACTED_IN]-(a:Actor) RETURN count(a) AS result"
          column: result
    relationships:
      actors: { type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
      director:
        type: DIRECTED
        direction: IN
        target: Person
        list: false
        nestedOperations: [CONNECT, DISCONNECT]
  Series:
    attributes:
      id: { type: ID, unique: true, nullable: false }
      title: { type: String, nullable: false }
      episodes: { type: Int }
    relationships:
      actors: { type: STARRED_IN, direction: IN, target: Actor, properties: StarredIn }
  Actor:
    attributes:
      name: { type: String, nullable: false }
      age: { type: Int }
    relationships:
      actedIn: { type: ACTED_IN, target: Production, properties: ActedIn }
      movies: { type: ACTED_IN, target: Movie, properties: ActedIn }
      credits: { type: CREDITED_IN, target: Search }
  Person:
    labels: [Person, Crew]
    attributes:
      name: { type: String, nullable: false }
      born: { type: Int }
    limit: { default: 10, max: 50 }
  User:
    attributes:
      id: { type: ID, nullable: false }
      name: { type: String }
    relationships:
      posts: { type: HAS_POST, target: Post }
  Post:
    attributes:
      id: { type: ID, nullable: false }
      content: { type: String }
      authorId: { type: ID }
      secret:
        type: String
        authorization:
          - kind: validate
            operations: [READ]
            where:
              jwt: { roles_INCLUDES: "admin" }
    relationships:
      author: { type: HAS_POST, direction: IN, target: User, list: false }
    authorization:
      - kind: filter
        operations: [READ, AGGREGATE]
        where:
          node: { authorId: "$jwt.sub" }
      - kind: validate
        operations: [UPDATE, DELETE]
        when: [BEFORE]
        where:
          node: { authorId: "$jwt.sub" }
      - kind: validate
        operations: [CREATE, UPDATE]
        when: [AFTER]
        where:
          node: { authorId: "$jwt.sub" }
relationshipProperties:
  ActedIn:
    attributes:
      screenTime: { type: Int }
      role: { type: String }
  StarredIn:
    attributes:
      episodeCount: { type: Int }
interfaces:
  Production:
    implementations: [Movie, Series]
    attributes:
      id: { type: ID, unique: true, nullable: false }
      title: { type: String, nullable: false }
    relationships:
      actors: { type: ACTED_IN, direction: IN, target: Actor, properties: ActedIn }
unions:
  Search:
    members: [Movie, Person]
"#;

pub fn movie_schema() -> GraphSchema {
    GraphSchemaConfig::from_yaml_str(MOVIE_SCHEMA_YAML)
        .and_then(|config| config.build())
        .expect("fixture schema must build")
}
